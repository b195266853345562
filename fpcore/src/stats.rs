use std::fmt;

use serde::Serialize;

/// Counters collected over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    /// Analysis invocations.
    pub computations: usize,
    /// `set` calls issued to the store, including no-ops.
    pub set_calls: usize,
    /// Commits that refined an intermediate value.
    pub updates: usize,
    /// Commits that closed an EPK.
    pub finalized: usize,
    /// EPKs finalized to bottom because no analysis computes their kind.
    pub fallbacks: usize,
    /// Computations created by the first query of a lazily scheduled EPK.
    pub lazy_triggers: usize,
    /// Times the worklist stalled and the cycle resolver ran.
    pub resolution_rounds: usize,
    /// EPKs finalized by the cycle resolver.
    pub cycle_resolved: usize,
    /// Batches handed to the executor.
    pub batches: usize,
    /// Largest worklist length observed.
    pub peak_worklist: usize,
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} computations in {} batches, {} set calls ({} updates, {} finalized), {} fallbacks, {} lazy triggers, {} cycle-resolved EPKs over {} rounds, peak worklist {}",
            self.computations,
            self.batches,
            self.set_calls,
            self.updates,
            self.finalized,
            self.fallbacks,
            self.lazy_triggers,
            self.cycle_resolved,
            self.resolution_rounds,
            self.peak_worklist
        )
    }
}
