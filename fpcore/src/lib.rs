//! Generic fixpoint engine computing properties of program entities.
//!
//! Analyses are registered per property kind on a [`scheduler::Scheduler`], each kind
//! bound to a finite-height [`lattice::Lattice`]. The scheduler runs them until no value
//! in the [`store::PropertyStore`] can be refined any further, resolving cyclic
//! dependencies between analyses on the way. Most consumers only need the items
//! re-exported in [`prelude`].

pub mod analysis;
pub mod entity;
pub mod kind;
pub mod lattice;
mod resolver;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod tracker;
pub mod utils;

pub mod prelude {
    pub use crate::analysis::{Analysis, Outcome, QueryContext, SchedulingMode, from_fn};
    pub use crate::entity::{Entity, EntityModel, Epk, StaticDomains};
    pub use crate::kind::{KindId, PropertyKind};
    pub use crate::lattice::{Lattice, SetLattice};
    pub use crate::scheduler::{Phase, Scheduler};
    pub use crate::stats::RunStatistics;
    pub use crate::store::{FinalValue, PropertyStore, PropertyValue, Provenance, SetOutcome};
    pub use crate::utils::{
        cancel::CancellationToken,
        conf::{EngineConfig, OpaqueObject, WorklistOrder},
        error::{FpError, FpResult},
    };
}
