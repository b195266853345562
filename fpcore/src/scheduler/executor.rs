use std::{
    collections::{HashMap, HashSet},
    panic::{self, AssertUnwindSafe},
};

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
    analysis::{DynOutcome, QueryContext, Read},
    entity::{Entity, Epk},
    kind::KindId,
    scheduler::Registration,
    store::PropertyStore,
    utils::{
        conf::ContextObjects,
        error::{FpError, FpResult},
    },
};

/// Everything a computation produced, applied to the store by the scheduler.
pub(crate) struct TaskResult<E: Entity> {
    pub epk: Epk<E>,
    pub outcome: DynOutcome,
    pub reads: SmallVec<Read<E>, 4>,
    pub demanded: Vec<Epk<E>>,
    pub fallbacks: Vec<Epk<E>>,
}

/// Read-only state shared by the computations of one batch.
pub(crate) struct Executor<'a, E: Entity> {
    pub store: &'a PropertyStore<E>,
    pub analyses: &'a HashMap<KindId, Registration<E>>,
    pub analyzed: &'a HashSet<KindId>,
    pub objects: &'a ContextObjects,
}

impl<E: Entity> Executor<'_, E> {
    /// Compute every EPK of `batch` and return the results in batch order.
    pub fn execute(&self, batch: &[Epk<E>], threads: usize) -> FpResult<Vec<TaskResult<E>>> {
        if threads <= 1 || batch.len() <= 1 {
            return batch.iter().map(|epk| self.compute(epk)).collect();
        }

        let pending = SegQueue::new();
        for index in 0..batch.len() {
            pending.push(index);
        }
        let results = Mutex::new(Vec::with_capacity(batch.len()));

        crossbeam::thread::scope(|scope| {
            for _ in 0..threads.min(batch.len()) {
                scope.spawn(|_| {
                    while let Some(index) = pending.pop() {
                        let result = self.compute(&batch[index]);
                        results.lock().push((index, result));
                    }
                });
            }
        })
        .map_err(|_| FpError::AnalysisPanicked {
            analysis: "<worker>".to_string(),
            epk: "<batch>".to_string(),
        })?;

        let mut results = results.into_inner();
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    fn compute(&self, epk: &Epk<E>) -> FpResult<TaskResult<E>> {
        let registration = self
            .analyses
            .get(&epk.kind)
            .ok_or(FpError::UnknownKind(epk.kind.index()))?;

        let mut ctx = QueryContext::new(self.store, self.analyzed, self.objects, epk);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            registration.analysis.compute_dyn(&epk.entity, &mut ctx)
        }))
        .map_err(|_| FpError::AnalysisPanicked {
            analysis: registration.analysis.name().to_string(),
            epk: self.store.describe(epk),
        })?;

        Ok(TaskResult {
            epk: epk.clone(),
            outcome,
            reads: ctx.reads,
            demanded: ctx.demanded,
            fallbacks: ctx.fallbacks,
        })
    }
}
