use fpcore::chain_lattice;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIs, EnumIter, IntoEnumIterator};

/// Immutability of a field, a class or a type.
///
/// The same lattice serves the three targets; each gets its own property kind.
#[derive(
    Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, EnumIs, EnumIter,
)]
pub enum Immutability {
    /// Immutable, and so is everything reachable from it.
    Transitive,
    /// Transitively immutable once its generic type parameters are.
    Dependent,
    /// Immutable, but reachable objects may not be.
    NonTransitive,
    Mutable,
}

chain_lattice!(Immutability: Transitive < Dependent < NonTransitive < Mutable);

/// Program element an immutability result is about.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, EnumIter, Display)]
pub enum ImmutabilityTarget {
    Field,
    Class,
    Type,
}

impl Immutability {
    fn prefix(self) -> &'static str {
        match self {
            Immutability::Transitive => "TransitivelyImmutable",
            Immutability::Dependent => "DependentlyImmutable",
            Immutability::NonTransitive => "NonTransitivelyImmutable",
            Immutability::Mutable => "Mutable",
        }
    }

    /// Annotation declaring this result for `target`, e.g. `TransitivelyImmutableClass`.
    pub fn to_annotation(self, target: ImmutabilityTarget) -> String {
        format!("{}{}", self.prefix(), target)
    }

    /// Parse an annotation name into its value and target.
    pub fn from_annotation(name: &str) -> Option<(Self, ImmutabilityTarget)> {
        let name = name.strip_prefix('@').unwrap_or(name);
        Immutability::iter().find_map(|value| {
            let rest = name.strip_prefix(value.prefix())?;
            ImmutabilityTarget::iter()
                .find(|target| target.to_string() == rest)
                .map(|target| (value, target))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpcore::lattice::Lattice;

    #[test]
    fn chain_order() {
        assert_eq!(Immutability::bottom(), Immutability::Transitive);
        assert_eq!(
            Immutability::Dependent.join(&Immutability::NonTransitive),
            Immutability::NonTransitive
        );
        assert!(Immutability::Mutable.is_mutable());
    }

    #[test]
    fn annotations_carry_their_target() {
        assert_eq!(
            Immutability::NonTransitive.to_annotation(ImmutabilityTarget::Field),
            "NonTransitivelyImmutableField"
        );
        assert_eq!(
            Immutability::from_annotation("@DependentlyImmutableClass"),
            Some((Immutability::Dependent, ImmutabilityTarget::Class))
        );
        assert_eq!(
            Immutability::from_annotation("MutableType"),
            Some((Immutability::Mutable, ImmutabilityTarget::Type))
        );
        assert_eq!(Immutability::from_annotation("MutableMethod"), None);
    }
}
