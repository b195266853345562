//! Property kinds and their per-store registry.
//!
//! A [`PropertyKind<V>`] is a typed, copyable handle binding a category of property
//! (field assignability, class immutability, ...) to its lattice `V`. Handles are only
//! produced by [`KindRegistry::register`], so a handle always refers to a kind of the
//! registry (and store) it was created by.
use std::{collections::HashMap, fmt, marker::PhantomData, sync::Arc};

use log::debug;

use crate::{
    lattice::{DynValue, Lattice},
    utils::error::{FpError, FpResult},
};

/// Untyped identifier of a property kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KindId(u32);

impl KindId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed handle of a property kind whose values live in lattice `V`.
pub struct PropertyKind<V> {
    id: KindId,
    _marker: PhantomData<fn() -> V>,
}

impl<V> PropertyKind<V> {
    pub fn id(&self) -> KindId {
        self.id
    }
}

impl<V> Clone for PropertyKind<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for PropertyKind<V> {}

impl<V> PartialEq for PropertyKind<V> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<V> Eq for PropertyKind<V> {}

impl<V> fmt::Debug for PropertyKind<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyKind").field(&self.id).finish()
    }
}

impl<V> From<PropertyKind<V>> for KindId {
    fn from(kind: PropertyKind<V>) -> Self {
        kind.id
    }
}

/// Lattice metadata kept for a registered kind.
#[derive(Debug, Clone)]
pub struct KindInfo {
    pub name: String,
    pub bottom: DynValue,
    pub height: Option<usize>,
    pub value_type: &'static str,
}

/// Registry of the property kinds known to one store.
#[derive(Debug, Default)]
pub struct KindRegistry {
    kinds: Vec<KindInfo>,
    by_name: HashMap<String, KindId>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new kind named `name` whose values live in lattice `V`.
    pub fn register<V: Lattice>(&mut self, name: &str) -> FpResult<PropertyKind<V>> {
        if self.by_name.contains_key(name) {
            return Err(FpError::DuplicateKind(name.to_string()));
        }

        let id = KindId(self.kinds.len() as u32);
        self.kinds.push(KindInfo {
            name: name.to_string(),
            bottom: Arc::new(V::bottom()),
            height: V::height(),
            value_type: std::any::type_name::<V>(),
        });
        self.by_name.insert(name.to_string(), id);

        debug!(
            "Registered property kind '{}' as {} (lattice `{}`, height {:?})",
            name,
            id,
            std::any::type_name::<V>(),
            V::height()
        );
        Ok(PropertyKind {
            id,
            _marker: PhantomData,
        })
    }

    pub fn info(&self, id: KindId) -> FpResult<&KindInfo> {
        self.kinds
            .get(id.0 as usize)
            .ok_or(FpError::UnknownKind(id.0))
    }

    /// Name of the kind, or a placeholder for identifiers foreign to this registry.
    pub fn name(&self, id: KindId) -> &str {
        self.kinds
            .get(id.0 as usize)
            .map(|info| info.name.as_str())
            .unwrap_or("<unknown kind>")
    }

    pub fn lookup(&self, name: &str) -> Option<KindId> {
        self.by_name.get(name).copied()
    }

    /// Iterate over all registered kinds in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (KindId, &KindInfo)> {
        self.kinds
            .iter()
            .enumerate()
            .map(|(index, info)| (KindId(index as u32), info))
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
