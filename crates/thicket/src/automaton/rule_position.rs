//! Dotted rules.
//!
//! A [`RulePosition`] marks how far one option of a rule has been matched.
//! Concatenations and choice options count items from zero. Lists only need
//! to know whether at least one item has been matched; separated lists also
//! distinguish "expecting a separator" from "expecting the next item".

use super::transition::RuntimeGuard;
use crate::rule::{Rhs, RuleId, RuleSet};
use smallvec::{SmallVec, smallvec};
use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

pub const START_OF_RULE: u32 = 0;
pub const END_OF_RULE: u32 = u32::MAX;

/// List position after at least one item
pub const LIST_ITEM: u32 = 1;
/// Separated list position after an item
pub const SLIST_SEPARATOR: u32 = 1;
/// Separated list position after a separator
pub const SLIST_ITEM: u32 = 2;

pub const OPTION_ITEM: u32 = 0;
pub const OPTION_EMPTY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct RulePosition {
    rule: RuleId,
    option: u32,
    position: u32,
}

impl RulePosition {
    #[must_use]
    pub const fn new(rule: RuleId, option: u32, position: u32) -> Self {
        Self {
            rule,
            option,
            position,
        }
    }

    #[must_use]
    pub const fn start(rule: RuleId, option: u32) -> Self {
        Self::new(rule, option, START_OF_RULE)
    }

    #[must_use]
    pub const fn end(rule: RuleId, option: u32) -> Self {
        Self::new(rule, option, END_OF_RULE)
    }

    #[must_use]
    pub const fn rule(&self) -> RuleId {
        self.rule
    }

    #[must_use]
    pub const fn option(&self) -> u32 {
        self.option
    }

    #[must_use]
    pub const fn position(&self) -> u32 {
        self.position
    }

    #[must_use]
    pub const fn is_at_start(&self) -> bool {
        self.position == START_OF_RULE
    }

    #[must_use]
    pub const fn is_at_end(&self) -> bool {
        self.position == END_OF_RULE
    }

    /// The item this position is waiting for. `None` at the end of the rule
    /// and for terminals.
    #[must_use]
    pub fn item(&self, rule_set: &RuleSet) -> Option<RuleId> {
        if self.is_at_end() {
            return None;
        }
        rule_set.rule(self.rule).rhs()?.item_at(self.option, self.position)
    }

    /// Positions reachable by matching the item expected here, each with the
    /// guard that must hold for the item count after the step.
    pub(crate) fn advance(&self, rule_set: &RuleSet) -> SmallVec<[(Self, RuntimeGuard); 2]> {
        let Some(rhs) = rule_set.rule(self.rule).rhs() else {
            return SmallVec::new();
        };
        let end = (Self::end(self.rule, self.option), RuntimeGuard::None);
        match rhs {
            Rhs::Concatenation(items) if self.option == 0 => {
                self.next_in_sequence(items.len())
            }
            Rhs::Choice { options, .. } => {
                let len = options.get(self.option as usize).map_or(0, Vec::len);
                self.next_in_sequence(len)
            }
            Rhs::List { min, max, .. } if self.option == 0 => {
                let mut next = SmallVec::new();
                if *max != Some(1) {
                    next.push((
                        Self::new(self.rule, 0, LIST_ITEM),
                        RuntimeGuard::can_repeat(*max, false),
                    ));
                }
                next.push((Self::end(self.rule, 0), RuntimeGuard::can_end(*min, false)));
                next
            }
            Rhs::SeparatedList { min, max, .. } if self.option == 0 => {
                if self.position == SLIST_SEPARATOR {
                    return smallvec![(Self::new(self.rule, 0, SLIST_ITEM), RuntimeGuard::None)];
                }
                let mut next = SmallVec::new();
                if *max != Some(1) {
                    next.push((
                        Self::new(self.rule, 0, SLIST_SEPARATOR),
                        RuntimeGuard::can_repeat(*max, true),
                    ));
                }
                next.push((Self::end(self.rule, 0), RuntimeGuard::can_end(*min, true)));
                next
            }
            _ => smallvec![end],
        }
    }

    fn next_in_sequence(&self, len: usize) -> SmallVec<[(Self, RuntimeGuard); 2]> {
        let next = self.position as usize + 1;
        if next < len {
            smallvec![(Self::new(self.rule, self.option, self.position + 1), RuntimeGuard::None)]
        } else {
            smallvec![(Self::end(self.rule, self.option), RuntimeGuard::None)]
        }
    }

    /// Items the rule still has to match from here, for FIRST computation.
    fn remaining(&self, rule_set: &RuleSet) -> SmallVec<[RuleId; 4]> {
        if self.is_at_end() {
            return SmallVec::new();
        }
        let Some(rhs) = rule_set.rule(self.rule).rhs() else {
            return SmallVec::new();
        };
        let from = self.position as usize;
        match rhs {
            Rhs::Concatenation(items) => items.get(from..).map(SmallVec::from_slice).unwrap_or_default(),
            Rhs::Choice { options, .. } => options
                .get(self.option as usize)
                .and_then(|items| items.get(from..))
                .map(SmallVec::from_slice)
                .unwrap_or_default(),
            Rhs::SeparatedList { item, separator, .. }
                if self.option == 0 && self.position == SLIST_SEPARATOR =>
            {
                smallvec![*separator, *item]
            }
            rhs => rhs
                .item_at(self.option, self.position)
                .into_iter()
                .collect(),
        }
    }

    /// FIRST of what the rule still has to match from here, and whether that
    /// can be nothing.
    pub(crate) fn first_from_here(&self, rule_set: &RuleSet) -> (BTreeSet<RuleId>, bool) {
        rule_set
            .first_sets()
            .first_of_sequence(&self.remaining(rule_set))
    }

    /// FIRST of what follows the item expected here, over every way the rule
    /// can continue.
    pub(crate) fn first_after_item(&self, rule_set: &RuleSet) -> (BTreeSet<RuleId>, bool) {
        let mut first = BTreeSet::new();
        let mut nullable = false;
        for (next, _) in self.advance(rule_set) {
            let (next_first, next_nullable) = next.first_from_here(rule_set);
            first.extend(next_first);
            nullable |= next_nullable;
        }
        (first, nullable)
    }
}

impl fmt::Display for RulePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_at_end() {
            write!(f, "{}[{}].EOR", self.rule, self.option)
        } else {
            write!(f, "{}[{}].{}", self.rule, self.option, self.position)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleExpr, RuleSetBuilder};

    #[test]
    fn test_concatenation_advances_to_end() {
        let rules = RuleSetBuilder::new("Seq")
            .rule("S", RuleExpr::seq([RuleExpr::literal("a"), RuleExpr::literal("b")]))
            .build()
            .unwrap();
        let s = rules.find_rule("S").unwrap();
        let start = RulePosition::start(s, 0);
        let next = start.advance(&rules);
        assert_eq!(next.as_slice(), &[(RulePosition::new(s, 0, 1), RuntimeGuard::None)]);
        let last = next[0].0.advance(&rules);
        assert!(last[0].0.is_at_end());
        assert_eq!(last[0].0.item(&rules), None);
    }

    #[test]
    fn test_list_advances_with_guards() {
        let rules = RuleSetBuilder::new("List")
            .rule("L", RuleExpr::list(RuleExpr::literal("x"), 2, Some(3)))
            .build()
            .unwrap();
        let l = rules.find_rule("L").unwrap();
        let next = RulePosition::start(l, 0).advance(&rules);
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].0, RulePosition::new(l, 0, LIST_ITEM));
        assert!(next[0].1.allows(2));
        assert!(!next[0].1.allows(3));
        assert!(next[1].0.is_at_end());
        assert!(!next[1].1.allows(1));
        assert!(next[1].1.allows(2));
    }

    #[test]
    fn test_separated_list_alternates_item_and_separator() {
        let rules = RuleSetBuilder::new("SList")
            .rule("L", RuleExpr::separated(RuleExpr::literal("x"), RuleExpr::literal(","), 1, None))
            .build()
            .unwrap();
        let l = rules.find_rule("L").unwrap();
        let x = RulePosition::start(l, 0).item(&rules).unwrap();
        let after_item = RulePosition::start(l, 0).advance(&rules);
        assert_eq!(after_item[0].0, RulePosition::new(l, 0, SLIST_SEPARATOR));
        let separator = after_item[0].0.item(&rules).unwrap();
        assert_ne!(separator, x);
        let after_separator = after_item[0].0.advance(&rules);
        assert_eq!(after_separator[0].0, RulePosition::new(l, 0, SLIST_ITEM));
        assert_eq!(after_separator[0].0.item(&rules), Some(x));

        let (first, nullable) = after_item[0].0.first_from_here(&rules);
        assert!(first.contains(&separator));
        assert!(!nullable);
    }
}
