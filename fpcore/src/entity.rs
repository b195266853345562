use std::{collections::HashMap, fmt::Debug, hash::Hash};

use crate::kind::KindId;

/// Opaque identifier of an analyzable program element (field, method, class, call site).
///
/// Entities are supplied by the entity model and never change during a run. Any
/// hashable, totally ordered, thread-safe value qualifies.
pub trait Entity: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static {}

impl<T> Entity for T where T: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static {}

/// Entity-PropertyKind key, the unit of computation and storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epk<E> {
    pub entity: E,
    pub kind: KindId,
}

impl<E> Epk<E> {
    pub fn new(entity: E, kind: KindId) -> Self {
        Self { entity, kind }
    }
}

/// Supplies the entities an eagerly scheduled analysis runs on.
pub trait EntityModel<E: Entity> {
    /// Entities in the domain of `kind`.
    fn domain(&self, kind: KindId) -> Vec<E>;
}

impl<E: Entity, F> EntityModel<E> for F
where
    F: Fn(KindId) -> Vec<E>,
{
    fn domain(&self, kind: KindId) -> Vec<E> {
        self(kind)
    }
}

/// Entity model backed by explicit per-kind entity lists.
#[derive(Debug, Clone)]
pub struct StaticDomains<E> {
    domains: HashMap<KindId, Vec<E>>,
}

impl<E> Default for StaticDomains<E> {
    fn default() -> Self {
        Self {
            domains: HashMap::new(),
        }
    }
}

impl<E: Entity> StaticDomains<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `entities` to the domain of `kind`.
    pub fn with_domain(mut self, kind: KindId, entities: impl IntoIterator<Item = E>) -> Self {
        self.domains.entry(kind).or_default().extend(entities);
        self
    }
}

impl<E: Entity> EntityModel<E> for StaticDomains<E> {
    fn domain(&self, kind: KindId) -> Vec<E> {
        self.domains.get(&kind).cloned().unwrap_or_default()
    }
}
