//! The scheduler drives a run to its fixpoint.
//!
//! A run goes through the following phases:
//!
//! * [`Phase::Setup`]: kinds, analyses, context objects, presets and forced EPKs are
//!   registered. Registration is rejected in every later phase.
//! * [`Phase::Eager`]: every entity of the domain of an eagerly scheduled kind gets a
//!   computation on the worklist, as do forced EPKs.
//! * [`Phase::Running`]: computations are popped from the worklist and executed;
//!   their results are committed to the store and the consumers of every changed EPK
//!   are queued again. The first query of an EPK nobody computed yet creates its
//!   computation (lazy scheduling).
//! * [`Phase::Stalled`]: the worklist is empty but some EPKs are still open. The cycle
//!   resolver closes the dependency cycles that can no longer make progress and the
//!   run resumes with the consumers of the resolved EPKs.
//! * [`Phase::Done`] once no open EPK remains, or [`Phase::Aborted`] after a fatal
//!   error or a cancellation.
//!
//! ## Concurrency
//! With more than one thread, popped EPKs are computed in batches of distinct EPKs on
//! scoped worker threads that share the store read-only. Results are committed on the
//! calling thread, in the order the EPKs were popped, so at most one computation is in
//! flight per EPK and every write goes through a single writer.
use std::collections::{HashMap, HashSet};

use log::{debug, info, trace, warn};
use strum::{Display, EnumIs};

use crate::{
    analysis::{Analysis, DynAnalysis, SchedulingMode},
    entity::{Entity, EntityModel, Epk},
    kind::{KindId, PropertyKind},
    lattice::Lattice,
    resolver,
    stats::RunStatistics,
    store::{PropertyStore, PropertyValue, Provenance, SetOutcome},
    utils::{
        cancel::CancellationToken,
        conf::{ContextObjects, EngineConfig, OpaqueObject},
        error::{FpError, FpResult},
    },
};

mod executor;
mod worklist;

use executor::{Executor, TaskResult};
use worklist::Worklist;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs, Display)]
pub enum Phase {
    Setup,
    Eager,
    Running,
    Stalled,
    Done,
    Aborted,
}

/// A registered analysis and how it is scheduled.
pub(crate) struct Registration<E: Entity> {
    pub mode: SchedulingMode,
    pub analysis: Box<dyn DynAnalysis<E>>,
}

/// Drives the analyses registered on it to a fixpoint over its property store.
///
/// ```
/// # use fpcore::prelude::*;
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// enum Purity { Pure, Impure }
/// fpcore::chain_lattice!(Purity: Pure < Impure);
///
/// let mut scheduler = Scheduler::<String>::new(EngineConfig::default());
/// let purity = scheduler.register_kind::<Purity>("purity").unwrap();
/// scheduler
///     .register_analysis(
///         purity,
///         SchedulingMode::Eager,
///         from_fn("purity", |m: &String, _: &mut QueryContext<'_, String>| {
///             Outcome::Final(if m.starts_with("set") { Purity::Impure } else { Purity::Pure })
///         }),
///     )
///     .unwrap();
///
/// let model = StaticDomains::new().with_domain(purity.id(), ["getX".to_string(), "setX".to_string()]);
/// let stats = scheduler.run(&model).unwrap();
/// assert_eq!(stats.computations, 2);
/// assert_eq!(scheduler.store().final_value(&"setX".to_string(), purity), Some(Purity::Impure));
/// ```
pub struct Scheduler<E: Entity> {
    config: EngineConfig,
    store: PropertyStore<E>,
    analyses: HashMap<KindId, Registration<E>>,
    analyzed: HashSet<KindId>,
    objects: ContextObjects,
    forced: Vec<Epk<E>>,
    worklist: Worklist<E>,
    phase: Phase,
    stats: RunStatistics,
    cancel: CancellationToken,
}

impl<E: Entity> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<E: Entity> Scheduler<E> {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: PropertyStore::with_limits(config.store_limits()),
            worklist: Worklist::new(config.order),
            config,
            analyses: HashMap::new(),
            analyzed: HashSet::new(),
            objects: ContextObjects::new(),
            forced: Vec::new(),
            phase: Phase::Setup,
            stats: RunStatistics::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Run on an existing store, e.g. one already holding preset values.
    pub fn with_store(config: EngineConfig, mut store: PropertyStore<E>) -> Self {
        store.set_limits(config.store_limits());
        Self {
            store,
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn store(&self) -> &PropertyStore<E> {
        &self.store
    }

    pub fn into_store(self) -> PropertyStore<E> {
        self.store
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    /// Token cancelling this run when triggered, from any thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn ensure_setup(&self) -> FpResult<()> {
        if self.phase.is_setup() {
            Ok(())
        } else {
            Err(FpError::RegistrationClosed {
                phase: self.phase.to_string(),
            })
        }
    }

    pub fn register_kind<V: Lattice>(&mut self, name: &str) -> FpResult<PropertyKind<V>> {
        self.ensure_setup()?;
        self.store.register_kind(name)
    }

    /// Bind `analysis` to `kind`. At most one analysis computes a kind.
    pub fn register_analysis<A>(
        &mut self,
        kind: PropertyKind<A::Value>,
        mode: SchedulingMode,
        analysis: A,
    ) -> FpResult<()>
    where
        A: Analysis<E> + 'static,
    {
        self.ensure_setup()?;
        let name = self.store.kinds().info(kind.id())?.name.clone();
        if self.analyses.contains_key(&kind.id()) {
            return Err(FpError::DuplicateAnalysis(name));
        }

        debug!(
            "Registered {} analysis '{}' for kind '{}'",
            mode,
            <A as Analysis<E>>::name(&analysis),
            name
        );
        self.analyzed.insert(kind.id());
        self.analyses.insert(
            kind.id(),
            Registration {
                mode,
                analysis: Box::new(analysis),
            },
        );
        Ok(())
    }

    /// Make `object` available to analyses through [`crate::analysis::QueryContext::object`].
    pub fn insert_object<T: OpaqueObject>(&mut self, object: T) -> FpResult<()> {
        self.ensure_setup()?;
        self.objects.insert(object);
        Ok(())
    }

    /// Seed `entity` with the final `value` of `kind`.
    pub fn preset<V: Lattice>(
        &mut self,
        entity: &E,
        kind: PropertyKind<V>,
        value: V,
    ) -> FpResult<SetOutcome> {
        self.ensure_setup()?;
        self.store.set(entity, kind, PropertyValue::Final(value))
    }

    /// Compute `kind` for `entity` even if nothing queries it.
    pub fn force<V: Lattice>(&mut self, entity: E, kind: PropertyKind<V>) -> FpResult<()> {
        self.ensure_setup()?;
        self.store.kinds().info(kind.id())?;
        self.forced.push(Epk::new(entity, kind.id()));
        Ok(())
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("Scheduler phase {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Run every registered analysis to its fixpoint.
    ///
    /// A scheduler runs once; afterwards the results are read through [`Self::store`].
    pub fn run(&mut self, model: &impl EntityModel<E>) -> FpResult<RunStatistics> {
        self.ensure_setup()?;
        info!(
            "Starting fixpoint run over {} kinds with {} analyses ({} eager) on {} thread(s)",
            self.store.kinds().len(),
            self.analyses.len(),
            self.analyses
                .values()
                .filter(|registration| registration.mode.is_eager())
                .count(),
            self.config.threads.max(1)
        );

        let result = self.drive(model);
        self.stats.set_calls = self.store.set_calls();
        match result {
            Ok(()) => {
                self.enter(Phase::Done);
                info!("Fixpoint reached: {}", self.stats);
                Ok(self.stats.clone())
            }
            Err(err) => {
                self.enter(Phase::Aborted);
                warn!("Fixpoint run aborted: {}", err);
                Err(err)
            }
        }
    }

    fn drive(&mut self, model: &impl EntityModel<E>) -> FpResult<()> {
        self.enter(Phase::Eager);
        let mut eager: Vec<KindId> = self
            .analyses
            .iter()
            .filter(|(_, registration)| registration.mode.is_eager())
            .map(|(kind, _)| *kind)
            .collect();
        eager.sort();

        for kind in eager {
            let domain = model.domain(kind);
            debug!(
                "Scheduling {} entities of kind '{}'",
                domain.len(),
                self.store.kinds().name(kind)
            );
            for entity in domain {
                self.schedule(Epk::new(entity, kind))?;
            }
        }
        for epk in std::mem::take(&mut self.forced) {
            self.schedule(epk)?;
        }
        // EPKs seeded with an intermediate value still need their computation.
        for epk in self.store.open_epks() {
            self.schedule(epk)?;
        }

        loop {
            self.enter(Phase::Running);
            self.drain()?;
            self.check_cancelled()?;

            if self.store.open_count() == 0 {
                return Ok(());
            }

            self.enter(Phase::Stalled);
            self.stats.resolution_rounds += 1;
            let resolution = resolver::resolve(&mut self.store)?;
            debug!(
                "Resolution round {} closed {} cycles ({} EPKs), {} consumers to rerun",
                self.stats.resolution_rounds,
                resolution.components,
                resolution.resolved.len(),
                resolution.stale.len()
            );
            self.stats.cycle_resolved += resolution.resolved.len();
            self.stats.finalized += resolution.resolved.len();
            for epk in resolution.stale {
                self.enqueue(epk);
            }
        }
    }

    fn check_cancelled(&self) -> FpResult<()> {
        if self.cancel.is_cancelled() {
            return Err(FpError::Cancelled {
                open: self.store.open_count(),
            });
        }
        Ok(())
    }

    /// Process the worklist until it is empty.
    fn drain(&mut self) -> FpResult<()> {
        let threads = self.config.threads.max(1);
        let batch_size = if threads > 1 {
            self.config.batch_size.max(1)
        } else {
            1
        };

        while !self.worklist.is_empty() {
            self.check_cancelled()?;

            let mut batch = self.worklist.pop_batch(batch_size);
            batch.retain(|epk| self.store.provenance(epk).is_none());
            if batch.is_empty() {
                continue;
            }
            self.stats.batches += 1;

            let executor = Executor {
                store: &self.store,
                analyses: &self.analyses,
                analyzed: &self.analyzed,
                objects: &self.objects,
            };
            let results = executor.execute(&batch, threads)?;
            for result in results {
                self.apply(result)?;
            }
        }
        Ok(())
    }

    /// Commit the result of one computation and queue whatever it affected.
    fn apply(&mut self, result: TaskResult<E>) -> FpResult<()> {
        let TaskResult {
            epk,
            outcome,
            reads,
            demanded,
            fallbacks,
        } = result;
        self.stats.computations += 1;
        trace!(
            "Computed {} = {:?} ({})",
            self.store.describe(&epk),
            outcome.value,
            if outcome.is_final {
                "final"
            } else {
                "intermediate"
            }
        );

        for fallback in &fallbacks {
            self.materialize_fallback(fallback)?;
        }
        for lazy in demanded {
            let description = self.store.describe(&lazy);
            if self.schedule(lazy)? {
                self.stats.lazy_triggers += 1;
                debug!(
                    "Lazily scheduled {} on demand of {}",
                    description,
                    self.store.describe(&epk)
                );
            }
        }

        self.store.clear_dependencies(&epk);
        let finality = outcome.is_final.then_some(Provenance::Computed);
        let commit = self.store.commit(&epk, outcome.value, finality)?;
        self.record(commit.outcome);
        for consumer in commit.stale {
            self.enqueue(consumer);
        }

        if !outcome.is_final {
            let mut outdated = false;
            for read in reads {
                outdated |= self.store.register_read(&epk, &read.producer, read.observed);
            }
            if outdated {
                self.enqueue(epk);
            }
        }
        Ok(())
    }

    /// Put `epk` on the worklist. Returns `true` if this created its computation.
    fn schedule(&mut self, epk: Epk<E>) -> FpResult<bool> {
        if self.store.provenance(&epk).is_some() {
            return Ok(false);
        }
        if !self.analyzed.contains(&epk.kind) {
            self.materialize_fallback(&epk)?;
            return Ok(false);
        }

        let created = self.store.open(&epk)?;
        self.enqueue(epk);
        Ok(created)
    }

    fn enqueue(&mut self, epk: Epk<E>) {
        if self.worklist.push(epk) {
            self.stats.peak_worklist = self.stats.peak_worklist.max(self.worklist.len());
        }
    }

    /// Finalize an EPK no analysis computes with its current value, bottom if unset.
    fn materialize_fallback(&mut self, epk: &Epk<E>) -> FpResult<()> {
        let value = match self.store.slot(epk) {
            Some(slot) if slot.state.is_final() => return Ok(()),
            Some(slot) => slot.value.clone(),
            None => self.store.kinds().info(epk.kind)?.bottom.clone(),
        };

        let commit = self.store.commit(epk, value, Some(Provenance::Fallback))?;
        if self.config.trace_fallbacks {
            debug!("Fallback value for {}", self.store.describe(epk));
        }
        self.stats.fallbacks += 1;
        self.record(commit.outcome);
        for consumer in commit.stale {
            self.enqueue(consumer);
        }
        Ok(())
    }

    fn record(&mut self, outcome: SetOutcome) {
        match outcome {
            SetOutcome::Unchanged => {}
            SetOutcome::Updated => self.stats.updates += 1,
            SetOutcome::Finalized => self.stats.finalized += 1,
        }
    }
}
