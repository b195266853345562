use fpcore::{analysis::QueryContext, entity::Entity, utils::conf::OpaqueObject};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIs};

/// Whether the analyzed code may be extended by code the analysis does not see.
///
/// Under [`WorldAssumption::Open`], unknown subclasses and callers may exist, so
/// analyses have to treat non-private members as observable and overridable. Provide
/// it to a run with `Scheduler::insert_object`; runs without one are closed-world.
#[derive(
    Debug, Clone, Copy, Default, Hash, PartialEq, Eq, Serialize, Deserialize, EnumIs, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum WorldAssumption {
    #[default]
    Closed,
    Open,
}

impl OpaqueObject for WorldAssumption {}

impl WorldAssumption {
    /// The assumption of the run `ctx` belongs to.
    pub fn of<E: Entity>(ctx: &QueryContext<'_, E>) -> Self {
        ctx.object::<WorldAssumption>()
            .copied()
            .unwrap_or_default()
    }
}
