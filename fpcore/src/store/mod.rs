//! The property store.
//!
//! The store is the authoritative table of current knowledge: for every EPK it keeps
//! the current lattice value, whether that value is final, and a version counter that
//! grows on every effective commit. Values only move upward in their lattice and a
//! final value never changes; every commit is checked against both rules before it
//! touches any state, so a rejected commit leaves the store exactly as it was.
//!
//! The store owns the [`DependencyTracker`]: committing a new value for an EPK returns
//! the consumers whose recorded read of it became stale.
//!
//! ## Concurrency
//! Reads only need `&PropertyStore` and may run from many threads at once. Writes
//! need `&mut PropertyStore`, which the scheduler holds as the single writer.
use std::{collections::HashMap, sync::Arc};

use log::trace;
use strum::EnumIs;

use crate::{
    entity::{Entity, Epk},
    kind::{KindId, KindRegistry, PropertyKind},
    lattice::{DynValue, Lattice},
    tracker::DependencyTracker,
    utils::error::{FpError, FpResult},
};

pub mod value;

pub use value::{FinalValue, PropertyValue, Provenance, SetOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIs)]
pub(crate) enum SlotState {
    Open,
    Final(Provenance),
}

#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub value: DynValue,
    pub state: SlotState,
    /// Bumped on every commit that changed the value or closed the slot.
    pub version: u64,
    /// Number of strict increases of the value.
    pub changes: usize,
    /// Number of effective commits.
    pub updates: usize,
}

/// Result of a commit: what happened and which consumers must be recomputed.
#[derive(Debug)]
pub(crate) struct Commit<E> {
    pub outcome: SetOutcome,
    pub stale: Vec<Epk<E>>,
}

/// Checks applied on every commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub max_updates_per_epk: Option<usize>,
    pub check_lattice_height: bool,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_updates_per_epk: None,
            check_lattice_height: true,
        }
    }
}

pub struct PropertyStore<E: Entity> {
    kinds: KindRegistry,
    slots: HashMap<Epk<E>, Slot>,
    tracker: DependencyTracker<E>,
    limits: StoreLimits,
    set_calls: usize,
}

impl<E: Entity> Default for PropertyStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> PropertyStore<E> {
    pub fn new() -> Self {
        Self::with_limits(StoreLimits::default())
    }

    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            kinds: KindRegistry::new(),
            slots: HashMap::new(),
            tracker: DependencyTracker::new(),
            limits,
            set_calls: 0,
        }
    }

    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    pub fn register_kind<V: Lattice>(&mut self, name: &str) -> FpResult<PropertyKind<V>> {
        self.kinds.register(name)
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    pub(crate) fn set_limits(&mut self, limits: StoreLimits) {
        self.limits = limits;
    }

    /// Render an EPK as `entity@kind` for diagnostics.
    pub fn describe(&self, epk: &Epk<E>) -> String {
        format!("{:?}@{}", epk.entity, self.kinds.name(epk.kind))
    }

    pub(crate) fn slot(&self, epk: &Epk<E>) -> Option<&Slot> {
        self.slots.get(epk)
    }

    pub(crate) fn tracker(&self) -> &DependencyTracker<E> {
        &self.tracker
    }

    /// Current value of an EPK. Never blocks; unset EPKs read as intermediate bottom.
    pub fn get<V: Lattice>(&self, entity: &E, kind: PropertyKind<V>) -> PropertyValue<V> {
        let epk = Epk::new(entity.clone(), kind.id());
        let Some(slot) = self.slots.get(&epk) else {
            return PropertyValue::bottom();
        };

        // Typed handles come from this store's registry, so the downcast only fails
        // for a handle of another store; bottom is the sound answer then.
        let value = slot
            .value
            .downcast_ref::<V>()
            .cloned()
            .unwrap_or_else(V::bottom);
        match slot.state {
            SlotState::Open => PropertyValue::Intermediate(value),
            SlotState::Final(_) => PropertyValue::Final(value),
        }
    }

    /// Final value of an EPK, if it has one.
    pub fn final_value<V: Lattice>(&self, entity: &E, kind: PropertyKind<V>) -> Option<V> {
        match self.get(entity, kind) {
            PropertyValue::Final(value) => Some(value),
            PropertyValue::Intermediate(_) => None,
        }
    }

    pub fn provenance(&self, epk: &Epk<E>) -> Option<Provenance> {
        match self.slots.get(epk)?.state {
            SlotState::Final(provenance) => Some(provenance),
            SlotState::Open => None,
        }
    }

    /// Set the value of an EPK.
    ///
    /// This is the write path the scheduler uses on behalf of analyses, and the way to
    /// seed EPKs before a run (a final value set here is recorded as
    /// [`Provenance::Preset`]). Setting a value that is not above the current one, or
    /// changing a final value, is an error. Setting a final EPK to its current value is
    /// a no-op.
    pub fn set<V: Lattice>(
        &mut self,
        entity: &E,
        kind: PropertyKind<V>,
        value: PropertyValue<V>,
    ) -> FpResult<SetOutcome> {
        let epk = Epk::new(entity.clone(), kind.id());
        let (finality, value) = match value {
            PropertyValue::Final(value) => (Some(Provenance::Preset), value),
            PropertyValue::Intermediate(value) => (None, value),
        };
        Ok(self.commit(&epk, Arc::new(value), finality)?.outcome)
    }

    /// Record that `consumer` read `producer` while it was intermediate.
    pub fn register_dependency(&mut self, consumer: &Epk<E>, producer: &Epk<E>) {
        let observed = self.slots.get(producer).map_or(0, |slot| slot.version);
        self.tracker.register(consumer, producer, observed);
    }

    /// Record a read of `producer` at `observed` version. Returns `true` if the read is
    /// already outdated and the consumer must run again.
    pub(crate) fn register_read(
        &mut self,
        consumer: &Epk<E>,
        producer: &Epk<E>,
        observed: u64,
    ) -> bool {
        match self.slots.get(producer) {
            Some(slot) if slot.state.is_final() || slot.version > observed => true,
            _ => {
                self.tracker.register(consumer, producer, observed);
                false
            }
        }
    }

    pub(crate) fn clear_dependencies(&mut self, consumer: &Epk<E>) {
        self.tracker.clear_consumer(consumer);
    }

    /// Create an open slot holding bottom. Returns `false` if the EPK already exists.
    pub(crate) fn open(&mut self, epk: &Epk<E>) -> FpResult<bool> {
        if self.slots.contains_key(epk) {
            return Ok(false);
        }

        let bottom = self.kinds.info(epk.kind)?.bottom.clone();
        self.slots.insert(
            epk.clone(),
            Slot {
                value: bottom,
                state: SlotState::Open,
                version: 0,
                changes: 0,
                updates: 0,
            },
        );
        Ok(true)
    }

    /// Commit `value` for `epk`, final with the given provenance or intermediate.
    pub(crate) fn commit(
        &mut self,
        epk: &Epk<E>,
        value: DynValue,
        finality: Option<Provenance>,
    ) -> FpResult<Commit<E>> {
        self.set_calls += 1;

        let info = self.kinds.info(epk.kind)?;
        if value.value_type_name() != info.value_type {
            return Err(FpError::KindMismatch {
                kind: info.name.clone(),
                expected: info.value_type,
                found: value.value_type_name(),
            });
        }
        let height = info.height;
        let bottom = info.bottom.clone();

        let (previous, state, version, changes, updates) = match self.slots.get(epk) {
            Some(slot) => (
                slot.value.clone(),
                slot.state,
                slot.version,
                slot.changes,
                slot.updates,
            ),
            None => (bottom, SlotState::Open, 0, 0, 0),
        };

        let same = previous.eq_dyn(&*value);
        if let SlotState::Final(_) = state {
            if same {
                return Ok(Commit {
                    outcome: SetOutcome::Unchanged,
                    stale: Vec::new(),
                });
            }
            return Err(FpError::FinalValueChanged {
                epk: self.describe(epk),
                previous: format!("{:?}", previous),
                proposed: format!("{:?}", value),
            });
        }

        if !previous.leq_dyn(&*value).unwrap_or(false) {
            return Err(FpError::MonotonicityViolation {
                epk: self.describe(epk),
                previous: format!("{:?}", previous),
                proposed: format!("{:?}", value),
            });
        }

        if same && finality.is_none() {
            return Ok(Commit {
                outcome: SetOutcome::Unchanged,
                stale: Vec::new(),
            });
        }

        let changes = changes + usize::from(!same);
        if let Some(height) = height.filter(|_| self.limits.check_lattice_height) {
            if changes > height {
                return Err(FpError::LatticeHeightExceeded {
                    epk: self.describe(epk),
                    height,
                    changes,
                });
            }
        }

        let updates = updates + 1;
        if let Some(limit) = self.limits.max_updates_per_epk {
            if updates > limit {
                return Err(FpError::UpdateLimitExceeded {
                    epk: self.describe(epk),
                    limit,
                });
            }
        }

        // All checks passed, apply.
        let version = version + 1;
        let (state, outcome) = match finality {
            Some(provenance) => (SlotState::Final(provenance), SetOutcome::Finalized),
            None => (SlotState::Open, SetOutcome::Updated),
        };
        trace!(
            "Commit {} -> {:?} ({:?}, version {})",
            self.describe(epk),
            value,
            outcome,
            version
        );
        self.slots.insert(
            epk.clone(),
            Slot {
                value,
                state,
                version,
                changes,
                updates,
            },
        );

        let stale = self.tracker.stale_consumers(epk, version);
        if outcome.is_finalized() {
            self.tracker.clear_consumer(epk);
        }
        Ok(Commit { outcome, stale })
    }

    /// Iterate over all final values, sorted by EPK.
    pub fn final_values(&self) -> impl Iterator<Item = FinalValue<E>> + '_ {
        let mut finals: Vec<(&Epk<E>, &Slot, Provenance)> = self
            .slots
            .iter()
            .filter_map(|(epk, slot)| match slot.state {
                SlotState::Final(provenance) => Some((epk, slot, provenance)),
                SlotState::Open => None,
            })
            .collect();
        finals.sort_by(|a, b| a.0.cmp(b.0));

        finals.into_iter().map(|(epk, slot, provenance)| FinalValue {
            entity: epk.entity.clone(),
            kind: epk.kind,
            value: slot.value.clone(),
            provenance,
        })
    }

    /// EPKs that are not final yet, sorted.
    pub fn open_epks(&self) -> Vec<Epk<E>> {
        let mut open: Vec<Epk<E>> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.state.is_open())
            .map(|(epk, _)| epk.clone())
            .collect();
        open.sort();
        open
    }

    pub fn open_count(&self) -> usize {
        self.slots.values().filter(|slot| slot.state.is_open()).count()
    }

    /// Entities holding a value (final or not) for `kind`, sorted.
    pub fn entities(&self, kind: KindId) -> Vec<E> {
        let mut entities: Vec<E> = self
            .slots
            .keys()
            .filter(|epk| epk.kind == kind)
            .map(|epk| epk.entity.clone())
            .collect();
        entities.sort();
        entities
    }

    /// All properties known for `entity`, as `(kind, value, is_final)` sorted by kind.
    pub fn properties(&self, entity: &E) -> Vec<(KindId, DynValue, bool)> {
        let mut properties: Vec<(KindId, DynValue, bool)> = self
            .slots
            .iter()
            .filter(|(epk, _)| &epk.entity == entity)
            .map(|(epk, slot)| (epk.kind, slot.value.clone(), slot.state.is_final()))
            .collect();
        properties.sort_by_key(|(kind, _, _)| *kind);
        properties
    }

    /// Producers `epk` currently waits on.
    pub fn dependees(&self, epk: &Epk<E>) -> Vec<Epk<E>> {
        self.tracker.dependees(epk).cloned().collect()
    }

    /// Number of `set` calls so far, including rejected and no-op ones.
    pub fn set_calls(&self) -> usize {
        self.set_calls
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::SetLattice;

    type Callees = SetLattice<u32>;

    fn store() -> (PropertyStore<&'static str>, PropertyKind<Callees>) {
        let mut store = PropertyStore::new();
        let kind = store.register_kind::<Callees>("callees").unwrap();
        (store, kind)
    }

    #[test]
    fn unset_epks_read_as_intermediate_bottom() {
        let (store, kind) = store();
        assert_eq!(
            store.get(&"m", kind),
            PropertyValue::Intermediate(Callees::bottom())
        );
        assert!(store.final_value(&"m", kind).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn values_only_move_upward() {
        let (mut store, kind) = store();
        let small = Callees::singleton(1);
        let large: Callees = [1, 2].into_iter().collect();

        assert!(
            store
                .set(&"m", kind, PropertyValue::Intermediate(large.clone()))
                .unwrap()
                .is_updated()
        );
        let err = store
            .set(&"m", kind, PropertyValue::Intermediate(small))
            .unwrap_err();
        assert!(matches!(err, FpError::MonotonicityViolation { ref epk, .. } if epk == "\"m\"@callees"));

        // The rejected commit left the store untouched.
        assert_eq!(store.get(&"m", kind), PropertyValue::Intermediate(large));
    }

    #[test]
    fn final_values_are_frozen_but_idempotent() {
        let (mut store, kind) = store();
        let value = Callees::singleton(3);

        let outcome = store
            .set(&"m", kind, PropertyValue::Final(value.clone()))
            .unwrap();
        assert!(outcome.is_finalized());

        let again = store
            .set(&"m", kind, PropertyValue::Final(value.clone()))
            .unwrap();
        assert!(again.is_unchanged());

        let bigger: Callees = [3, 4].into_iter().collect();
        let err = store
            .set(&"m", kind, PropertyValue::Final(bigger))
            .unwrap_err();
        assert!(matches!(err, FpError::FinalValueChanged { .. }));

        let epk = Epk::new("m", kind.id());
        assert_eq!(store.provenance(&epk), Some(Provenance::Preset));
        assert_eq!(store.set_calls(), 3);
    }

    #[test]
    fn commits_report_stale_consumers() {
        let (mut store, kind) = store();
        let producer = Epk::new("p", kind.id());
        let consumer = Epk::new("c", kind.id());

        store.open(&producer).unwrap();
        assert!(!store.register_read(&consumer, &producer, 0));
        assert_eq!(store.dependees(&consumer), vec![producer.clone()]);

        let commit = store
            .commit(&producer, Arc::new(Callees::singleton(9)), None)
            .unwrap();
        assert_eq!(commit.stale, vec![consumer.clone()]);

        // Reading an older version than the current one is immediately stale.
        assert!(store.register_read(&consumer, &producer, 0));
    }

    #[test]
    fn finalizing_removes_outgoing_edges() {
        let (mut store, kind) = store();
        let a = Epk::new("a", kind.id());
        let b = Epk::new("b", kind.id());
        store.open(&a).unwrap();
        store.open(&b).unwrap();
        store.register_dependency(&a, &b);

        store
            .commit(&a, Arc::new(Callees::singleton(1)), Some(Provenance::Computed))
            .unwrap();
        assert!(store.dependees(&a).is_empty());
        assert_eq!(store.open_epks(), vec![b]);
    }

    #[test]
    fn update_limit_is_enforced() {
        let mut store = PropertyStore::with_limits(StoreLimits {
            max_updates_per_epk: Some(2),
            check_lattice_height: false,
        });
        let kind = store.register_kind::<Callees>("callees").unwrap();

        for i in 0..2 {
            let value: Callees = (0..=i).collect();
            store
                .set(&"m", kind, PropertyValue::Intermediate(value))
                .unwrap();
        }
        let err = store
            .set(&"m", kind, PropertyValue::Intermediate((0..=5).collect()))
            .unwrap_err();
        assert!(matches!(err, FpError::UpdateLimitExceeded { limit: 2, .. }));
    }

    #[test]
    fn inspection_helpers_are_sorted() {
        let (mut store, kind) = store();
        for name in ["z", "a", "m"] {
            store
                .set(&name, kind, PropertyValue::Final(Callees::singleton(1)))
                .unwrap();
        }

        assert_eq!(store.entities(kind.id()), vec!["a", "m", "z"]);
        let finals: Vec<_> = store.final_values().map(|f| f.entity).collect();
        assert_eq!(finals, vec!["a", "m", "z"]);
        assert_eq!(store.properties(&"m").len(), 1);
    }
}
