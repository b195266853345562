//! Resolution of cyclic dependencies.
//!
//! When the worklist runs dry while some EPKs are still open, every open EPK waits on
//! other open EPKs. The waits form a directed graph (consumer to producer); its
//! strongly connected components that have no edge leaving the component cannot
//! receive any further update from outside and are closed here: every member takes
//! the join of the current values of the members of the same kind and is finalized
//! with [`Provenance::CycleResolved`]. Components that still wait on another
//! component are left for a later round, after their dependees were finalized and
//! their consumers recomputed.
use std::collections::{BTreeSet, HashMap};

use log::debug;
use petgraph::{
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
};

use crate::{
    entity::{Entity, Epk},
    kind::KindId,
    lattice::DynValue,
    store::{PropertyStore, Provenance},
    utils::error::{FpError, FpResult},
};

/// What one resolution round did.
#[derive(Debug)]
pub(crate) struct Resolution<E> {
    /// EPKs finalized by this round.
    pub resolved: Vec<Epk<E>>,
    /// Number of components closed.
    pub components: usize,
    /// Open consumers that read one of the resolved EPKs, sorted.
    pub stale: Vec<Epk<E>>,
}

/// Close every component of open EPKs that does not depend on another open component.
pub(crate) fn resolve<E: Entity>(store: &mut PropertyStore<E>) -> FpResult<Resolution<E>> {
    let open = store.open_epks();
    if open.is_empty() {
        return Ok(Resolution {
            resolved: Vec::new(),
            components: 0,
            stale: Vec::new(),
        });
    }

    let position: HashMap<&Epk<E>, usize> =
        open.iter().enumerate().map(|(i, epk)| (epk, i)).collect();
    let mut graph = DiGraph::<usize, ()>::with_capacity(open.len(), store.tracker().edge_count());
    for i in 0..open.len() {
        graph.add_node(i);
    }
    for (i, consumer) in open.iter().enumerate() {
        for producer in store.tracker().dependees(consumer) {
            if let Some(&j) = position.get(producer) {
                graph.add_edge(NodeIndex::new(i), NodeIndex::new(j), ());
            }
        }
    }

    let components = tarjan_scc(&graph);
    let mut component_of = vec![0usize; open.len()];
    for (c, members) in components.iter().enumerate() {
        for node in members {
            component_of[node.index()] = c;
        }
    }

    let closed: Vec<&Vec<NodeIndex>> = components
        .iter()
        .enumerate()
        .filter(|(c, members)| {
            members.iter().all(|node| {
                graph
                    .neighbors(*node)
                    .all(|next| component_of[next.index()] == *c)
            })
        })
        .map(|(_, members)| members)
        .collect();

    // Guard: the condensation of a finite graph always has a sink component.
    if closed.is_empty() {
        return Err(FpError::Deadlock {
            epks: open.iter().map(|epk| store.describe(epk)).collect(),
        });
    }

    let mut resolved = Vec::new();
    let mut stale = BTreeSet::new();
    for members in &closed {
        let mut members: Vec<Epk<E>> = members
            .iter()
            .map(|node| open[node.index()].clone())
            .collect();
        members.sort();

        let joined = join_per_kind(store, &members)?;
        debug!(
            "Resolving cycle of {} EPKs: {}",
            members.len(),
            members
                .iter()
                .map(|epk| store.describe(epk))
                .collect::<Vec<_>>()
                .join(", ")
        );

        for epk in &members {
            let Some(value) = joined.get(&epk.kind) else {
                continue;
            };
            let commit = store.commit(epk, value.clone(), Some(Provenance::CycleResolved))?;
            stale.extend(commit.stale);
        }
        resolved.extend(members);
    }

    for epk in &resolved {
        stale.remove(epk);
    }

    Ok(Resolution {
        resolved,
        components: closed.len(),
        stale: stale.into_iter().collect(),
    })
}

/// Join of the current values of `members`, one per kind.
fn join_per_kind<E: Entity>(
    store: &PropertyStore<E>,
    members: &[Epk<E>],
) -> FpResult<HashMap<KindId, DynValue>> {
    let mut joined: HashMap<KindId, DynValue> = HashMap::new();
    for epk in members {
        let Some(slot) = store.slot(epk) else {
            continue;
        };
        let value = match joined.remove(&epk.kind) {
            None => slot.value.clone(),
            Some(acc) => acc.join_dyn(&*slot.value).ok_or_else(|| {
                let info = store.kinds().info(epk.kind);
                FpError::KindMismatch {
                    kind: store.kinds().name(epk.kind).to_string(),
                    expected: info.map_or("<unknown>", |info| info.value_type),
                    found: slot.value.value_type_name(),
                }
            })?,
        };
        joined.insert(epk.kind, value);
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{kind::PropertyKind, lattice::Lattice, store::PropertyValue};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Level {
        Low,
        Mid,
        High,
    }
    crate::chain_lattice!(Level: Low < Mid < High);

    fn store() -> (PropertyStore<u32>, PropertyKind<Level>) {
        let mut store = PropertyStore::new();
        let kind = store.register_kind::<Level>("level").unwrap();
        (store, kind)
    }

    fn raise(store: &mut PropertyStore<u32>, epk: &Epk<u32>, value: Level) {
        store.open(epk).unwrap();
        store.commit(epk, Arc::new(value), None).unwrap();
    }

    #[test]
    fn nothing_open_is_a_no_op() {
        let (mut store, _) = store();
        let resolution = resolve(&mut store).unwrap();
        assert!(resolution.resolved.is_empty());
        assert_eq!(resolution.components, 0);
    }

    #[test]
    fn two_cycle_is_finalized_with_the_join() {
        let (mut store, kind) = store();
        let a = Epk::new(1, kind.id());
        let b = Epk::new(2, kind.id());
        raise(&mut store, &a, Level::Mid);
        store.open(&b).unwrap();
        store.register_dependency(&a, &b);
        store.register_dependency(&b, &a);

        let resolution = resolve(&mut store).unwrap();
        assert_eq!(resolution.resolved, vec![a.clone(), b.clone()]);
        assert_eq!(resolution.components, 1);

        assert_eq!(store.get(&1, kind), PropertyValue::Final(Level::Mid));
        assert_eq!(store.get(&2, kind), PropertyValue::Final(Level::Mid));
        assert_eq!(store.provenance(&b), Some(Provenance::CycleResolved));
        assert!(store.open_epks().is_empty());
    }

    #[test]
    fn components_waiting_on_others_are_deferred() {
        let (mut store, kind) = store();
        // 1 <-> 2 form a cycle that also waits on the self-loop 3.
        let [a, b, c] = [1, 2, 3].map(|e| Epk::new(e, kind.id()));
        for epk in [&a, &b, &c] {
            store.open(epk).unwrap();
        }
        store.register_dependency(&a, &b);
        store.register_dependency(&b, &a);
        store.register_dependency(&b, &c);
        store.register_dependency(&c, &c);

        let resolution = resolve(&mut store).unwrap();
        assert_eq!(resolution.resolved, vec![c.clone()]);
        assert_eq!(resolution.stale, vec![b.clone()]);
        assert_eq!(store.open_epks(), vec![a, b]);
        assert_eq!(store.get(&3, kind), PropertyValue::Final(Level::bottom()));
    }

    #[test]
    fn isolated_open_epk_keeps_its_value() {
        let (mut store, kind) = store();
        let a = Epk::new(7, kind.id());
        raise(&mut store, &a, Level::High);

        resolve(&mut store).unwrap();
        assert_eq!(store.final_value(&7, kind), Some(Level::High));
    }
}
