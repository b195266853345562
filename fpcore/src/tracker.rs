//! Inverse dependency index.
//!
//! For every producer EPK the tracker remembers which consumers read it while it was
//! intermediate, together with the version they observed. When the producer is
//! committed again, consumers whose observed version is now outdated are handed back
//! to the scheduler.
use std::collections::{BTreeSet, HashMap};

use crate::entity::{Entity, Epk};

#[derive(Debug)]
pub struct DependencyTracker<E: Entity> {
    /// producer -> (consumer -> observed version)
    dependers: HashMap<Epk<E>, HashMap<Epk<E>, u64>>,
    /// consumer -> producers
    dependees: HashMap<Epk<E>, BTreeSet<Epk<E>>>,
}

impl<E: Entity> Default for DependencyTracker<E> {
    fn default() -> Self {
        Self {
            dependers: HashMap::new(),
            dependees: HashMap::new(),
        }
    }
}

impl<E: Entity> DependencyTracker<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `consumer` read `producer` at `observed` version.
    ///
    /// A repeated registration keeps the oldest observed version.
    pub fn register(&mut self, consumer: &Epk<E>, producer: &Epk<E>, observed: u64) {
        let seen = self
            .dependers
            .entry(producer.clone())
            .or_default()
            .entry(consumer.clone())
            .or_insert(observed);
        *seen = (*seen).min(observed);

        self.dependees
            .entry(consumer.clone())
            .or_default()
            .insert(producer.clone());
    }

    /// Drop every edge leaving `consumer`, typically before it is recomputed or once
    /// it is final.
    pub fn clear_consumer(&mut self, consumer: &Epk<E>) {
        let Some(producers) = self.dependees.remove(consumer) else {
            return;
        };

        for producer in producers {
            if let Some(consumers) = self.dependers.get_mut(&producer) {
                consumers.remove(consumer);
                if consumers.is_empty() {
                    self.dependers.remove(&producer);
                }
            }
        }
    }

    /// Consumers of `producer` that observed a version older than `version`, sorted.
    pub fn stale_consumers(&self, producer: &Epk<E>, version: u64) -> Vec<Epk<E>> {
        let mut stale: Vec<Epk<E>> = self
            .dependers
            .get(producer)
            .into_iter()
            .flatten()
            .filter(|(_, observed)| **observed < version)
            .map(|(consumer, _)| consumer.clone())
            .collect();
        stale.sort();
        stale
    }

    pub fn dependees(&self, consumer: &Epk<E>) -> impl Iterator<Item = &Epk<E>> {
        self.dependees.get(consumer).into_iter().flatten()
    }

    pub fn has_dependees(&self, consumer: &Epk<E>) -> bool {
        self.dependees.contains_key(consumer)
    }

    /// All `(consumer, producer)` edges.
    pub fn edges(&self) -> impl Iterator<Item = (&Epk<E>, &Epk<E>)> {
        self.dependees
            .iter()
            .flat_map(|(consumer, producers)| producers.iter().map(move |p| (consumer, p)))
    }

    pub fn edge_count(&self) -> usize {
        self.dependees.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.dependees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::KindRegistry;
    use crate::lattice::SetLattice;

    fn epks() -> (Epk<&'static str>, Epk<&'static str>, Epk<&'static str>) {
        let mut registry = KindRegistry::new();
        let kind = registry.register::<SetLattice<u8>>("k").unwrap().id();
        (Epk::new("a", kind), Epk::new("b", kind), Epk::new("c", kind))
    }

    #[test]
    fn stale_consumers_compare_versions() {
        let (a, b, c) = epks();
        let mut tracker = DependencyTracker::new();
        tracker.register(&a, &c, 1);
        tracker.register(&b, &c, 3);

        assert_eq!(tracker.stale_consumers(&c, 1), Vec::<Epk<&str>>::new());
        assert_eq!(tracker.stale_consumers(&c, 2), vec![a.clone()]);
        assert_eq!(tracker.stale_consumers(&c, 4), vec![a, b]);
    }

    #[test]
    fn repeated_registration_keeps_oldest_version() {
        let (a, _, c) = epks();
        let mut tracker = DependencyTracker::new();
        tracker.register(&a, &c, 2);
        tracker.register(&a, &c, 5);

        assert_eq!(tracker.stale_consumers(&c, 3), vec![a.clone()]);
        assert_eq!(tracker.edge_count(), 1);
    }

    #[test]
    fn clearing_a_consumer_removes_both_directions() {
        let (a, b, c) = epks();
        let mut tracker = DependencyTracker::new();
        tracker.register(&a, &b, 0);
        tracker.register(&a, &c, 0);
        tracker.register(&b, &c, 0);

        tracker.clear_consumer(&a);

        assert!(!tracker.has_dependees(&a));
        assert_eq!(tracker.stale_consumers(&c, 1), vec![b.clone()]);
        assert!(tracker.stale_consumers(&b, 1).is_empty());
        assert_eq!(tracker.edges().count(), 1);
    }
}
