use std::collections::{HashSet, VecDeque};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    entity::{Entity, Epk},
    utils::conf::WorklistOrder,
};

/// Pending computations, each EPK at most once.
pub(crate) struct Worklist<E: Entity> {
    queue: VecDeque<Epk<E>>,
    queued: HashSet<Epk<E>>,
    order: WorklistOrder,
    rng: Option<ChaCha8Rng>,
}

impl<E: Entity> Worklist<E> {
    pub fn new(order: WorklistOrder) -> Self {
        let rng = match order {
            WorklistOrder::Shuffled { seed } => Some(ChaCha8Rng::seed_from_u64(seed)),
            WorklistOrder::Fifo | WorklistOrder::Lifo => None,
        };

        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            order,
            rng,
        }
    }

    /// Returns `false` if `epk` was already pending.
    pub fn push(&mut self, epk: Epk<E>) -> bool {
        if !self.queued.insert(epk.clone()) {
            return false;
        }
        self.queue.push_back(epk);
        true
    }

    pub fn pop(&mut self) -> Option<Epk<E>> {
        let epk = match (self.order, self.rng.as_mut()) {
            (WorklistOrder::Shuffled { .. }, Some(rng)) if !self.queue.is_empty() => {
                let index = rng.random_range(0..self.queue.len());
                self.queue.swap_remove_back(index)
            }
            (WorklistOrder::Lifo, _) => self.queue.pop_back(),
            _ => self.queue.pop_front(),
        }?;
        self.queued.remove(&epk);
        Some(epk)
    }

    /// Pop up to `max` EPKs.
    pub fn pop_batch(&mut self, max: usize) -> Vec<Epk<E>> {
        let mut batch = Vec::with_capacity(max.min(self.queue.len()));
        while batch.len() < max {
            match self.pop() {
                Some(epk) => batch.push(epk),
                None => break,
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{KindId, KindRegistry};
    use crate::lattice::SetLattice;

    fn kind() -> KindId {
        KindRegistry::new()
            .register::<SetLattice<u8>>("k")
            .unwrap()
            .id()
    }

    fn drain(worklist: &mut Worklist<u32>) -> Vec<u32> {
        std::iter::from_fn(|| worklist.pop().map(|epk| epk.entity)).collect()
    }

    #[test]
    fn duplicates_are_ignored_while_pending() {
        let kind = kind();
        let mut worklist = Worklist::new(WorklistOrder::Fifo);
        assert!(worklist.push(Epk::new(1u32, kind)));
        assert!(!worklist.push(Epk::new(1u32, kind)));
        assert_eq!(worklist.len(), 1);

        worklist.pop();
        assert!(worklist.push(Epk::new(1u32, kind)));
    }

    #[test]
    fn fifo_and_lifo_orders() {
        let kind = kind();
        let mut fifo = Worklist::new(WorklistOrder::Fifo);
        let mut lifo = Worklist::new(WorklistOrder::Lifo);
        for i in 0..4u32 {
            fifo.push(Epk::new(i, kind));
            lifo.push(Epk::new(i, kind));
        }

        assert_eq!(drain(&mut fifo), vec![0, 1, 2, 3]);
        assert_eq!(drain(&mut lifo), vec![3, 2, 1, 0]);
    }

    #[test]
    fn shuffled_order_is_a_reproducible_permutation() {
        let kind = kind();
        let run = |seed| {
            let mut worklist = Worklist::new(WorklistOrder::Shuffled { seed });
            for i in 0..32u32 {
                worklist.push(Epk::new(i, kind));
            }
            drain(&mut worklist)
        };

        let first = run(11);
        assert_eq!(first, run(11));

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn batches_respect_the_limit() {
        let kind = kind();
        let mut worklist = Worklist::new(WorklistOrder::Fifo);
        for i in 0..5u32 {
            worklist.push(Epk::new(i, kind));
        }

        assert_eq!(worklist.pop_batch(3).len(), 3);
        assert_eq!(worklist.pop_batch(3).len(), 2);
        assert!(worklist.is_empty());
    }
}
