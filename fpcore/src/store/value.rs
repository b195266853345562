use serde::Serialize;
use strum::{Display, EnumIs};

use crate::{
    kind::KindId,
    lattice::{DynValue, Lattice},
};

/// Current knowledge about one EPK.
#[derive(Debug, Clone, PartialEq, EnumIs)]
pub enum PropertyValue<V> {
    /// No further refinement is possible.
    Final(V),
    /// Current best approximation, still refinable.
    Intermediate(V),
}

impl<V> PropertyValue<V> {
    pub fn value(&self) -> &V {
        match self {
            PropertyValue::Final(value) | PropertyValue::Intermediate(value) => value,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            PropertyValue::Final(value) | PropertyValue::Intermediate(value) => value,
        }
    }
}

impl<V: Lattice> PropertyValue<V> {
    /// The default of every EPK nothing is known about.
    pub fn bottom() -> Self {
        PropertyValue::Intermediate(V::bottom())
    }
}

/// Where a final value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs, Display, Serialize)]
pub enum Provenance {
    /// Produced by the analysis registered for the kind.
    Computed,
    /// Assigned by the cycle resolver when a dependency cycle could not progress.
    CycleResolved,
    /// Lattice bottom, because no analysis is registered for the kind.
    Fallback,
    /// Seeded before the run started.
    Preset,
}

/// Effect of a `set` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIs)]
pub enum SetOutcome {
    Unchanged,
    Updated,
    Finalized,
}

/// One entry of the result of a run.
#[derive(Debug, Clone)]
pub struct FinalValue<E> {
    pub entity: E,
    pub kind: KindId,
    pub value: DynValue,
    pub provenance: Provenance,
}

impl<E> FinalValue<E> {
    /// Typed view of the value, `None` if `V` is not the lattice of the kind.
    pub fn downcast<V: Lattice>(&self) -> Option<&V> {
        self.value.downcast_ref::<V>()
    }
}

impl<E: PartialEq> PartialEq for FinalValue<E> {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity
            && self.kind == other.kind
            && self.provenance == other.provenance
            && self.value.eq_dyn(&*other.value)
    }
}
