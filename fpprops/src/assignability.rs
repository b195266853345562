use fpcore::chain_lattice;
use serde::{Deserialize, Serialize};
use strum::{EnumIs, EnumIter, IntoEnumIterator};

/// Whether a field may be assigned after its object (or class) is initialized.
///
/// Variants are ordered from the most precise to the least precise result; an analysis
/// starts at [`FieldAssignability::NonAssignable`] and only ever weakens its claim.
#[derive(
    Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, EnumIs, EnumIter,
)]
pub enum FieldAssignability {
    /// Declared final.
    NonAssignable,
    /// Not declared final, but never written after initialization.
    EffectivelyNonAssignable,
    /// Written once, lazily, in a thread-safe way.
    LazilyInitialized,
    /// Written once, lazily, without synchronization.
    UnsafelyLazilyInitialized,
    Assignable,
}

chain_lattice!(
    FieldAssignability: NonAssignable
        < EffectivelyNonAssignable
        < LazilyInitialized
        < UnsafelyLazilyInitialized
        < Assignable
);

impl FieldAssignability {
    /// Name of the annotation declaring this result in test fixtures.
    pub fn to_annotation(self) -> &'static str {
        match self {
            FieldAssignability::NonAssignable => "NonAssignableField",
            FieldAssignability::EffectivelyNonAssignable => "EffectivelyNonAssignableField",
            FieldAssignability::LazilyInitialized => "LazilyInitializedField",
            FieldAssignability::UnsafelyLazilyInitialized => "UnsafelyLazilyInitializedField",
            FieldAssignability::Assignable => "AssignableField",
        }
    }

    /// Parse an annotation name, with or without its leading `@`.
    pub fn from_annotation(name: &str) -> Option<Self> {
        let name = name.strip_prefix('@').unwrap_or(name);
        FieldAssignability::iter().find(|value| value.to_annotation() == name)
    }

    /// The field never changes once its owner is visible to other code.
    pub fn is_effectively_final(self) -> bool {
        self <= FieldAssignability::LazilyInitialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpcore::lattice::Lattice;

    #[test]
    fn chain_order() {
        assert_eq!(FieldAssignability::bottom(), FieldAssignability::NonAssignable);
        assert_eq!(FieldAssignability::height(), Some(4));
        assert_eq!(
            FieldAssignability::LazilyInitialized.join(&FieldAssignability::EffectivelyNonAssignable),
            FieldAssignability::LazilyInitialized
        );
    }

    #[test]
    fn annotations() {
        assert_eq!(
            FieldAssignability::from_annotation("@EffectivelyNonAssignableField"),
            Some(FieldAssignability::EffectivelyNonAssignable)
        );
        assert_eq!(FieldAssignability::from_annotation("MutableField"), None);
        for value in FieldAssignability::iter() {
            assert_eq!(FieldAssignability::from_annotation(value.to_annotation()), Some(value));
        }
    }

    #[test]
    fn effectively_final() {
        assert!(FieldAssignability::LazilyInitialized.is_effectively_final());
        assert!(!FieldAssignability::UnsafelyLazilyInitialized.is_effectively_final());
    }
}
