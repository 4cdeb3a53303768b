//! Lookahead sets attached to transitions.

use crate::rule::RuleId;
use std::collections::BTreeSet;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Terminals that may follow a transition.
///
/// `includes_eot` admits the end of the text. `includes_runtime` means what
/// follows depends on the parse stack and is not known when the automaton is
/// built; such a set never rejects anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct LookaheadSet {
    terminals: BTreeSet<RuleId>,
    includes_eot: bool,
    includes_runtime: bool,
}

impl LookaheadSet {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn end_of_text() -> Self {
        Self {
            includes_eot: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn runtime() -> Self {
        Self {
            includes_runtime: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_terminals(terminals: impl IntoIterator<Item = RuleId>) -> Self {
        Self {
            terminals: terminals.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn terminals(&self) -> &BTreeSet<RuleId> {
        &self.terminals
    }

    #[must_use]
    pub const fn includes_eot(&self) -> bool {
        self.includes_eot
    }

    #[must_use]
    pub const fn includes_runtime(&self) -> bool {
        self.includes_runtime
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terminals.is_empty() && !self.includes_eot && !self.includes_runtime
    }

    pub fn add_terminals(&mut self, terminals: impl IntoIterator<Item = RuleId>) {
        self.terminals.extend(terminals);
    }

    pub fn set_eot(&mut self) {
        self.includes_eot = true;
    }

    pub fn set_runtime(&mut self) {
        self.includes_runtime = true;
    }

    pub fn union(&mut self, other: &Self) {
        self.terminals.extend(other.terminals.iter().copied());
        self.includes_eot |= other.includes_eot;
        self.includes_runtime |= other.includes_runtime;
    }
}
