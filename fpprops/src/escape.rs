use fpcore::lattice::Lattice;
use serde::{Deserialize, Serialize};

/// Ways an object can leave the method that allocated it without becoming globally
/// reachable.
#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscapeRoutes {
    pub parameter: bool,
    pub return_value: bool,
    pub abnormal_return: bool,
}

impl EscapeRoutes {
    fn union(self, other: Self) -> Self {
        Self {
            parameter: self.parameter || other.parameter,
            return_value: self.return_value || other.return_value,
            abnormal_return: self.abnormal_return || other.abnormal_return,
        }
    }

    fn subset_of(self, other: Self) -> bool {
        (!self.parameter || other.parameter)
            && (!self.return_value || other.return_value)
            && (!self.abnormal_return || other.abnormal_return)
    }
}

/// Escape state of an allocation site.
///
/// The routes of [`EscapeState::Via`] are not totally ordered: escaping through a
/// parameter and escaping through the return value are incomparable and join to
/// escaping through both.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscapeState {
    NoEscape,
    /// Passed to callees that do not let it escape further.
    InCallee,
    Via(EscapeRoutes),
    /// Reachable from a static field or a global heap object.
    Global,
}

impl EscapeState {
    pub fn via_parameter() -> Self {
        EscapeState::Via(EscapeRoutes {
            parameter: true,
            ..EscapeRoutes::default()
        })
    }

    pub fn via_return() -> Self {
        EscapeState::Via(EscapeRoutes {
            return_value: true,
            ..EscapeRoutes::default()
        })
    }

    pub fn via_abnormal_return() -> Self {
        EscapeState::Via(EscapeRoutes {
            abnormal_return: true,
            ..EscapeRoutes::default()
        })
    }

    /// Parse the escape annotations used by fixtures. `AtMost` annotations are upper
    /// bounds and parse to their bound.
    pub fn from_annotation(name: &str) -> Option<Self> {
        let name = name.strip_prefix('@').unwrap_or(name);
        let name = name.strip_prefix("AtMost").unwrap_or(name);
        Some(match name {
            "NoEscape" => EscapeState::NoEscape,
            "EscapeInCallee" => EscapeState::InCallee,
            "EscapeViaParameter" => Self::via_parameter(),
            "EscapeViaReturn" => Self::via_return(),
            "EscapeViaAbnormalReturn" => Self::via_abnormal_return(),
            "EscapeViaStaticField" | "EscapeViaHeapObject" | "GlobalEscape" => {
                EscapeState::Global
            }
            _ => return None,
        })
    }

    /// `self` is at most as bad as `bound`.
    pub fn within(&self, bound: &EscapeState) -> bool {
        self.less_than_or_equal(bound)
    }
}

impl Lattice for EscapeState {
    fn bottom() -> Self {
        EscapeState::NoEscape
    }

    fn join(&self, other: &Self) -> Self {
        use EscapeState::*;
        match (*self, *other) {
            (Global, _) | (_, Global) => Global,
            (Via(a), Via(b)) => Via(a.union(b)),
            (Via(routes), _) | (_, Via(routes)) => Via(routes),
            (InCallee, _) | (_, InCallee) => InCallee,
            (NoEscape, NoEscape) => NoEscape,
        }
    }

    fn less_than_or_equal(&self, other: &Self) -> bool {
        use EscapeState::*;
        match (*self, *other) {
            (NoEscape, _) | (_, Global) => true,
            (Global, _) => false,
            (InCallee, NoEscape) => false,
            (InCallee, _) => true,
            (Via(a), Via(b)) => a.subset_of(b),
            (Via(_), _) => false,
        }
    }

    fn height() -> Option<usize> {
        // NoEscape, InCallee, zero to three routes, Global.
        Some(6)
    }
}
