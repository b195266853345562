//! Lattices describing the values a property kind can take.
//!
//! Every property kind is bound to exactly one [`Lattice`]. The engine only ever
//! moves a value upward: `bottom` is the conservative default assigned when nothing
//! better is known, and [`Lattice::join`] merges contributions. Values are stored
//! type-erased inside the property store (see [`AnyLatticeValue`]) so that kinds with
//! heterogeneous value types can live side by side.
//!
//! ## Finite height
//! Termination of a run is bounded by the height of the lattices involved. The engine
//! cannot detect an infinite ascending chain in general, but a lattice that reports
//! its [`Lattice::height`] gets its updates counted, and exceeding the height is
//! reported as a fatal error.
use std::{collections::BTreeSet, fmt::Debug, sync::Arc};

use downcast_rs::{DowncastSync, impl_downcast};

/// A join-semilattice with a bottom element.
///
/// Implementations must make `join` commutative, associative and idempotent, with
/// `bottom()` as its identity, and `less_than_or_equal` must agree with it:
/// `a <= b` iff `a.join(b) == b`.
pub trait Lattice: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// The least element, used as the sound default of every EPK.
    fn bottom() -> Self;

    /// Least upper bound of `self` and `other`.
    fn join(&self, other: &Self) -> Self;

    /// Partial order of the lattice.
    fn less_than_or_equal(&self, other: &Self) -> bool;

    /// Length of the longest strictly ascending chain, when it is known.
    fn height() -> Option<usize> {
        None
    }
}

/// Object-safe view of a [`Lattice`] value.
///
/// All methods taking another value return `None` when the two values do not belong
/// to the same lattice type.
pub trait AnyLatticeValue: DowncastSync + Debug {
    fn join_dyn(&self, other: &dyn AnyLatticeValue) -> Option<DynValue>;

    fn leq_dyn(&self, other: &dyn AnyLatticeValue) -> Option<bool>;

    fn eq_dyn(&self, other: &dyn AnyLatticeValue) -> bool;

    fn value_type_name(&self) -> &'static str;
}
impl_downcast!(sync AnyLatticeValue);

/// Shared, type-erased lattice value.
pub type DynValue = Arc<dyn AnyLatticeValue>;

impl<V: Lattice> AnyLatticeValue for V {
    fn join_dyn(&self, other: &dyn AnyLatticeValue) -> Option<DynValue> {
        let other = other.downcast_ref::<V>()?;
        Some(Arc::new(self.join(other)))
    }

    fn leq_dyn(&self, other: &dyn AnyLatticeValue) -> Option<bool> {
        let other = other.downcast_ref::<V>()?;
        Some(self.less_than_or_equal(other))
    }

    fn eq_dyn(&self, other: &dyn AnyLatticeValue) -> bool {
        other.downcast_ref::<V>().is_some_and(|other| self == other)
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<V>()
    }
}

/// Implement [`Lattice`] for a totally ordered, field-less enum.
///
/// Variants are listed from the bottom of the chain to its top. The enum must derive
/// `Clone`, `Copy`, `Debug`, `PartialEq`, `Eq`, `PartialOrd` and `Ord`, with the
/// variants declared in the same order as they are listed here.
///
/// ```
/// # use fpcore::{chain_lattice, lattice::Lattice};
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// enum Level { Low, Mid, High }
/// chain_lattice!(Level: Low < Mid < High);
///
/// assert_eq!(Level::bottom(), Level::Low);
/// assert_eq!(Level::Mid.join(&Level::High), Level::High);
/// assert_eq!(Level::height(), Some(2));
/// ```
#[macro_export]
macro_rules! chain_lattice {
    (
        $ty:ident : $bottom:ident $( < $rest:ident )*
    ) => {
        impl $crate::lattice::Lattice for $ty {
            fn bottom() -> Self {
                $ty::$bottom
            }

            fn join(&self, other: &Self) -> Self {
                ::std::cmp::max(*self, *other)
            }

            fn less_than_or_equal(&self, other: &Self) -> bool {
                self <= other
            }

            fn height() -> Option<usize> {
                Some(<[&str]>::len(&[$( stringify!($rest) ),*]))
            }
        }
    };
}

/// Powerset lattice ordered by inclusion.
///
/// Finite height holds as long as the universe the elements are drawn from is finite,
/// which is the case for sets of program entities (e.g. the callees of a call site).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetLattice<T: Ord>(pub BTreeSet<T>);

impl<T: Ord> SetLattice<T> {
    pub fn singleton(elem: T) -> Self {
        Self(BTreeSet::from([elem]))
    }

    pub fn contains(&self, elem: &T) -> bool {
        self.0.contains(elem)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Ord> FromIterator<T> for SetLattice<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T> Lattice for SetLattice<T>
where
    T: Ord + Clone + Debug + Send + Sync + 'static,
{
    fn bottom() -> Self {
        Self(BTreeSet::new())
    }

    fn join(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }

    fn less_than_or_equal(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Tri {
        Low,
        Mid,
        High,
    }
    crate::chain_lattice!(Tri: Low < Mid < High);

    #[test]
    fn chain_lattice_orders_variants_from_bottom() {
        assert_eq!(Tri::bottom(), Tri::Low);
        assert_eq!(Tri::height(), Some(2));
        assert_eq!(Tri::Low.join(&Tri::Mid), Tri::Mid);
        assert_eq!(Tri::High.join(&Tri::Mid), Tri::High);
        assert!(Tri::Low.less_than_or_equal(&Tri::High));
        assert!(!Tri::High.less_than_or_equal(&Tri::Mid));
    }

    #[test]
    fn chain_join_laws() {
        let all = [Tri::Low, Tri::Mid, Tri::High];
        for a in all {
            assert_eq!(a.join(&a), a);
            assert_eq!(Tri::bottom().join(&a), a);
            for b in all {
                assert_eq!(a.join(&b), b.join(&a));
                assert_eq!(a.less_than_or_equal(&b), a.join(&b) == b);
                for c in all {
                    assert_eq!(a.join(&b).join(&c), a.join(&b.join(&c)));
                }
            }
        }
    }

    #[test]
    fn set_lattice_joins_by_union() {
        let a: SetLattice<&str> = ["foo", "bar"].into_iter().collect();
        let b = SetLattice::singleton("baz");
        let joined = a.join(&b);

        assert_eq!(joined.len(), 3);
        assert!(a.less_than_or_equal(&joined));
        assert!(b.less_than_or_equal(&joined));
        assert!(!joined.less_than_or_equal(&a));
        assert!(SetLattice::<&str>::bottom().is_empty());
    }

    #[test]
    fn erased_values_reject_foreign_types() {
        let tri: DynValue = Arc::new(Tri::Mid);
        let set: DynValue = Arc::new(SetLattice::singleton(1u32));

        assert!(tri.join_dyn(&*set).is_none());
        assert!(tri.leq_dyn(&*set).is_none());
        assert!(!tri.eq_dyn(&*set));

        let high: DynValue = Arc::new(Tri::High);
        let joined = tri.join_dyn(&*high).unwrap();
        assert_eq!(joined.downcast_ref::<Tri>(), Some(&Tri::High));
        assert_eq!(tri.leq_dyn(&*high), Some(true));
    }
}
