#![allow(dead_code)]

use std::collections::HashMap;

use fpcore::prelude::*;

/// Four-level chain, height 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    L0,
    L1,
    L2,
    L3,
}
fpcore::chain_lattice!(Level: L0 < L1 < L2 < L3);

impl Level {
    pub fn step(self) -> Self {
        match self {
            Level::L0 => Level::L1,
            Level::L1 => Level::L2,
            Level::L2 | Level::L3 => Level::L3,
        }
    }
}

pub type Ctx<'a> = QueryContext<'a, u32>;

/// Joins a base value with the values of a fixed set of dependencies; final once every
/// dependency is.
#[derive(Default)]
pub struct Graph {
    pub base: HashMap<u32, Level>,
    pub edges: HashMap<u32, Vec<(u32, PropertyKind<Level>)>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base(mut self, entity: u32, level: Level) -> Self {
        self.base.insert(entity, level);
        self
    }

    pub fn edge(mut self, from: u32, to: u32, kind: PropertyKind<Level>) -> Self {
        self.edges.entry(from).or_default().push((to, kind));
        self
    }
}

impl Analysis<u32> for Graph {
    type Value = Level;

    fn name(&self) -> &str {
        "graph"
    }

    fn compute(&self, entity: &u32, ctx: &mut Ctx<'_>) -> Outcome<Level> {
        let mut value = self.base.get(entity).copied().unwrap_or(Level::L0);
        let mut is_final = true;
        for (dependency, kind) in self.edges.get(entity).into_iter().flatten() {
            let read = ctx.get(dependency, *kind);
            is_final &= read.is_final();
            value = value.join(read.value());
        }

        if is_final {
            Outcome::Final(value)
        } else {
            Outcome::Intermediate(value)
        }
    }
}

pub fn level_of(scheduler: &Scheduler<u32>, entity: u32, kind: PropertyKind<Level>) -> Option<Level> {
    scheduler.store().final_value(&entity, kind)
}

pub fn provenance_of(
    scheduler: &Scheduler<u32>,
    entity: u32,
    kind: PropertyKind<Level>,
) -> Option<Provenance> {
    scheduler.store().provenance(&Epk::new(entity, kind.id()))
}
