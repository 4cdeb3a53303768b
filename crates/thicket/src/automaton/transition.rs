use super::lookahead::LookaheadSet;
use super::state::StateId;
use crate::rule::RuleId;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// What a transition does to the graph-structured stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ParseAction {
    /// Match a terminal at the current position.
    Width,
    /// A completed child starts a parent rule from the previous node's
    /// closure.
    Height,
    /// A completed child is attached to the previous node, which expects it.
    Graft,
    /// The goal rule is complete.
    Goal,
}

/// Condition on the number of children a list node has after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum RuntimeGuard {
    #[default]
    None,
    /// Another item may follow: fewer than `max` items so far.
    CanRepeat { max: usize, separated: bool },
    /// The list may end: at least `min` items so far.
    CanEnd { min: usize, separated: bool },
}

impl RuntimeGuard {
    pub(crate) const fn can_repeat(max: Option<usize>, separated: bool) -> Self {
        match max {
            Some(max) => Self::CanRepeat { max, separated },
            None => Self::None,
        }
    }

    pub(crate) const fn can_end(min: usize, separated: bool) -> Self {
        if min <= 1 {
            Self::None
        } else {
            Self::CanEnd { min, separated }
        }
    }

    /// Whether a node with `children` children (separators included) may take
    /// this step.
    #[must_use]
    pub const fn allows(&self, children: usize) -> bool {
        match *self {
            Self::None => true,
            Self::CanRepeat { max, separated } => item_count(children, separated) < max,
            Self::CanEnd { min, separated } => item_count(children, separated) >= min,
        }
    }
}

const fn item_count(children: usize, separated: bool) -> usize {
    if separated { children.div_ceil(2) } else { children }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transition {
    pub(crate) from: StateId,
    pub(crate) to: StateId,
    pub(crate) to_rule: RuleId,
    pub(crate) to_complete: bool,
    pub(crate) action: ParseAction,
    pub(crate) lookahead: LookaheadSet,
    pub(crate) guard: RuntimeGuard,
}

impl Transition {
    #[must_use]
    pub const fn from(&self) -> StateId {
        self.from
    }

    #[must_use]
    pub const fn to(&self) -> StateId {
        self.to
    }

    /// Rule of the target state; the matched terminal for width transitions.
    #[must_use]
    pub const fn to_rule(&self) -> RuleId {
        self.to_rule
    }

    #[must_use]
    pub const fn action(&self) -> ParseAction {
        self.action
    }

    #[must_use]
    pub const fn lookahead(&self) -> &LookaheadSet {
        &self.lookahead
    }

    #[must_use]
    pub const fn guard(&self) -> RuntimeGuard {
        self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separated_guard_counts_items() {
        let repeat = RuntimeGuard::can_repeat(Some(2), true);
        // x , x => three children, two items
        assert!(repeat.allows(1));
        assert!(!repeat.allows(3));
        let end = RuntimeGuard::can_end(2, true);
        assert!(!end.allows(1));
        assert!(end.allows(3));
    }

    #[test]
    fn test_trivial_guards_collapse() {
        assert_eq!(RuntimeGuard::can_repeat(None, false), RuntimeGuard::None);
        assert_eq!(RuntimeGuard::can_end(1, false), RuntimeGuard::None);
    }
}
