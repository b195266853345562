//! Contract between the engine and the concrete analyses plugged into it.
//!
//! An analysis computes the property of one kind for one entity. It reads the
//! properties it depends on through a [`QueryContext`] and returns an [`Outcome`]:
//!
//! * [`Outcome::Final`] when the value cannot be refined any further;
//! * [`Outcome::Intermediate`] with its current best approximation otherwise.
//!
//! The read set of an intermediate outcome is collected by the context: every
//! property read while it was not final becomes a dependency, and the analysis runs
//! again for the entity once one of those properties changes. Analyses never write to
//! the store and never block; they must be pure functions of the store state they
//! observe, as the result of a run relies on it.
//!
//! ## Object safety
//! [`Analysis`] has an associated value type; the blanket [`DynAnalysis`] impl erases it
//! so heterogeneous analyses can be stored side by side by the scheduler.
use std::{collections::HashSet, marker::PhantomData, sync::Arc};

use smallvec::SmallVec;
use strum::{Display, EnumIs};

use crate::{
    entity::{Entity, Epk},
    kind::{KindId, PropertyKind},
    lattice::{DynValue, Lattice},
    store::{PropertyStore, PropertyValue, SlotState},
    utils::conf::{ContextObjects, OpaqueObject},
};

/// When computations of an analysis are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs, Display)]
pub enum SchedulingMode {
    /// For every entity of the kind's domain, before the run starts.
    Eager,
    /// On the first query of an EPK of the kind.
    Lazy,
}

/// Result of one computation.
#[derive(Debug, Clone, PartialEq, EnumIs)]
pub enum Outcome<V> {
    Final(V),
    Intermediate(V),
}

impl<V> Outcome<V> {
    pub fn value(&self) -> &V {
        match self {
            Outcome::Final(value) | Outcome::Intermediate(value) => value,
        }
    }
}

/// A property computation.
pub trait Analysis<E: Entity>: Send + Sync {
    type Value: Lattice;

    /// Name used in logs and diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Compute the property of `entity`.
    fn compute(&self, entity: &E, ctx: &mut QueryContext<'_, E>) -> Outcome<Self::Value>;
}

/// Type-erased outcome.
#[derive(Debug, Clone)]
pub struct DynOutcome {
    pub value: DynValue,
    pub is_final: bool,
}

/// Object-safe analysis interface.
pub trait DynAnalysis<E: Entity>: Send + Sync {
    fn name(&self) -> &str;

    fn compute_dyn(&self, entity: &E, ctx: &mut QueryContext<'_, E>) -> DynOutcome;
}

impl<E: Entity, A: Analysis<E>> DynAnalysis<E> for A {
    fn name(&self) -> &str {
        Analysis::name(self)
    }

    fn compute_dyn(&self, entity: &E, ctx: &mut QueryContext<'_, E>) -> DynOutcome {
        match self.compute(entity, ctx) {
            Outcome::Final(value) => DynOutcome {
                value: Arc::new(value),
                is_final: true,
            },
            Outcome::Intermediate(value) => DynOutcome {
                value: Arc::new(value),
                is_final: false,
            },
        }
    }
}

/// Analysis backed by a closure.
pub struct FnAnalysis<E, V, F> {
    name: String,
    compute: F,
    _marker: PhantomData<fn(&E) -> V>,
}

/// Build an analysis from a closure.
///
/// ```
/// # use fpcore::{analysis::{from_fn, Outcome, QueryContext}, lattice::SetLattice};
/// let callees = from_fn("callees", |method: &String, _ctx: &mut QueryContext<'_, String>| {
///     Outcome::Final(SetLattice::singleton(method.len()))
/// });
/// # let _ = callees;
/// ```
pub fn from_fn<E, V, F>(name: &str, compute: F) -> FnAnalysis<E, V, F>
where
    E: Entity,
    V: Lattice,
    F: Fn(&E, &mut QueryContext<'_, E>) -> Outcome<V> + Send + Sync,
{
    FnAnalysis {
        name: name.to_string(),
        compute,
        _marker: PhantomData,
    }
}

impl<E, V, F> Analysis<E> for FnAnalysis<E, V, F>
where
    E: Entity,
    V: Lattice,
    F: Fn(&E, &mut QueryContext<'_, E>) -> Outcome<V> + Send + Sync,
{
    type Value = V;

    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, entity: &E, ctx: &mut QueryContext<'_, E>) -> Outcome<V> {
        (self.compute)(entity, ctx)
    }
}

/// A read of an intermediate (or not yet existing) property.
#[derive(Debug, Clone)]
pub(crate) struct Read<E> {
    pub producer: Epk<E>,
    pub observed: u64,
}

/// Read-only view of the store handed to a running analysis.
///
/// Besides answering queries, the context records what the scheduler has to do once
/// the computation returns: which dependencies to track, which lazy computations the
/// queries demanded and which fallback values must be materialized.
pub struct QueryContext<'a, E: Entity> {
    store: &'a PropertyStore<E>,
    analyzed: &'a HashSet<KindId>,
    objects: &'a ContextObjects,
    current: &'a Epk<E>,
    pub(crate) reads: SmallVec<Read<E>, 4>,
    pub(crate) demanded: Vec<Epk<E>>,
    pub(crate) fallbacks: Vec<Epk<E>>,
}

impl<'a, E: Entity> QueryContext<'a, E> {
    pub(crate) fn new(
        store: &'a PropertyStore<E>,
        analyzed: &'a HashSet<KindId>,
        objects: &'a ContextObjects,
        current: &'a Epk<E>,
    ) -> Self {
        Self {
            store,
            analyzed,
            objects,
            current,
            reads: SmallVec::new(),
            demanded: Vec::new(),
            fallbacks: Vec::new(),
        }
    }

    /// The EPK being computed.
    pub fn current(&self) -> &Epk<E> {
        self.current
    }

    /// Query the property `kind` of `entity`.
    ///
    /// Never blocks. A value that is not final yet is recorded as a dependency of the
    /// running computation. A kind no analysis computes yields its final bottom value.
    pub fn get<V: Lattice>(&mut self, entity: &E, kind: PropertyKind<V>) -> PropertyValue<V> {
        let epk = Epk::new(entity.clone(), kind.id());

        match self.store.slot(&epk).map(|slot| (slot.state, slot.version)) {
            Some((SlotState::Final(_), _)) => self.store.get(entity, kind),
            Some((SlotState::Open, version)) => {
                self.reads.push(Read {
                    producer: epk,
                    observed: version,
                });
                self.store.get(entity, kind)
            }
            None if self.analyzed.contains(&kind.id()) => {
                if !self.demanded.contains(&epk) {
                    self.demanded.push(epk.clone());
                }
                self.reads.push(Read {
                    producer: epk,
                    observed: 0,
                });
                PropertyValue::bottom()
            }
            None => {
                if !self.fallbacks.contains(&epk) {
                    self.fallbacks.push(epk);
                }
                PropertyValue::Final(V::bottom())
            }
        }
    }

    /// Run-scoped context object of type `T`, if one was provided.
    pub fn object<T: OpaqueObject>(&self) -> Option<&T> {
        self.objects.get::<T>()
    }

    /// Number of dependencies recorded so far.
    pub fn dependency_count(&self) -> usize {
        self.reads.len()
    }
}
