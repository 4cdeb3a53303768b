use super::rule_position::RulePosition;
use crate::rule::RuleId;
use std::fmt;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Number of a state within its automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct StateId(u32);

impl StateId {
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A parser state: rule positions of one rule that are either all complete
/// or all incomplete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserState {
    id: StateId,
    rule_positions: Vec<RulePosition>,
    rule: RuleId,
    is_complete: bool,
}

impl ParserState {
    /// `rule_positions` must be sorted, deduplicated and non-empty.
    pub(crate) fn new(id: StateId, rule_positions: Vec<RulePosition>) -> Self {
        debug_assert!(!rule_positions.is_empty());
        debug_assert!(rule_positions.windows(2).all(|w| w[0] < w[1]));
        let rule = rule_positions[0].rule();
        let is_complete = rule_positions[0].is_at_end();
        debug_assert!(
            rule_positions
                .iter()
                .all(|rp| rp.rule() == rule && rp.is_at_end() == is_complete)
        );
        Self {
            id,
            rule_positions,
            rule,
            is_complete,
        }
    }

    #[must_use]
    pub const fn id(&self) -> StateId {
        self.id
    }

    #[must_use]
    pub fn rule_positions(&self) -> &[RulePosition] {
        &self.rule_positions
    }

    #[must_use]
    pub const fn rule(&self) -> RuleId {
        self.rule
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Options completed by this state; empty unless the state is complete.
    pub fn completed_options(&self) -> impl Iterator<Item = u32> + '_ {
        self.rule_positions
            .iter()
            .filter(|rp| rp.is_at_end())
            .map(RulePosition::option)
    }
}

impl fmt::Display for ParserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state {} {{", self.id.0)?;
        for (i, rp) in self.rule_positions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{rp}")?;
        }
        f.write_str("}")
    }
}
