//! Property lattices of the field, class and method analyses run on `fpcore`.
//!
//! [`PropertyKinds::register`] registers the kinds of this crate on a scheduler under
//! their canonical names; the analyses computing them live with their users.

use fpcore::{
    entity::Entity, kind::PropertyKind, lattice::SetLattice, scheduler::Scheduler,
    utils::error::FpResult,
};

pub mod assignability;
pub mod escape;
pub mod immutability;
pub mod world;

pub use assignability::FieldAssignability;
pub use escape::{EscapeRoutes, EscapeState};
pub use immutability::{Immutability, ImmutabilityTarget};
pub use world::WorldAssumption;

/// Methods a call site may invoke, by name.
pub type Callees = SetLattice<String>;

/// Handles of every kind of this crate.
#[derive(Debug, Clone, Copy)]
pub struct PropertyKinds {
    pub field_assignability: PropertyKind<FieldAssignability>,
    pub field_immutability: PropertyKind<Immutability>,
    pub class_immutability: PropertyKind<Immutability>,
    pub type_immutability: PropertyKind<Immutability>,
    pub escape: PropertyKind<EscapeState>,
    pub callees: PropertyKind<Callees>,
}

impl PropertyKinds {
    pub fn register<E: Entity>(scheduler: &mut Scheduler<E>) -> FpResult<Self> {
        Ok(Self {
            field_assignability: scheduler.register_kind("field_assignability")?,
            field_immutability: scheduler.register_kind("field_immutability")?,
            class_immutability: scheduler.register_kind("class_immutability")?,
            type_immutability: scheduler.register_kind("type_immutability")?,
            escape: scheduler.register_kind("escape")?,
            callees: scheduler.register_kind("callees")?,
        })
    }

    /// Kind holding the immutability of `target`.
    pub fn immutability(&self, target: ImmutabilityTarget) -> PropertyKind<Immutability> {
        match target {
            ImmutabilityTarget::Field => self.field_immutability,
            ImmutabilityTarget::Class => self.class_immutability,
            ImmutabilityTarget::Type => self.type_immutability,
        }
    }
}
