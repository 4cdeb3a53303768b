//! FIRST sets and nullability.

use super::{Rule, RuleId, RuleKind, TerminalKind};
use std::collections::BTreeSet;

/// FIRST set and nullability of every rule of a rule set.
///
/// FIRST sets hold the non-empty terminals a rule can start with. Empty
/// terminals never appear in them; they make their owner nullable instead.
/// Computed by fixpoint iteration, so left recursion of any depth
/// terminates.
#[derive(Debug, Clone, Default)]
pub struct FirstSets {
    first: Vec<BTreeSet<RuleId>>,
    nullable: Vec<bool>,
}

impl FirstSets {
    pub(crate) fn compute(rules: &[Rule]) -> Self {
        let mut first = vec![BTreeSet::new(); rules.len()];
        let mut nullable = vec![false; rules.len()];

        for rule in rules {
            if let RuleKind::Terminal(kind) = &rule.kind {
                match kind {
                    TerminalKind::Empty => nullable[rule.id.index()] = true,
                    TerminalKind::Embedded { rule_set, goal } => {
                        first[rule.id.index()].insert(rule.id);
                        nullable[rule.id.index()] = rule_set.first_sets().is_nullable(*goal);
                    }
                    TerminalKind::Literal(_) | TerminalKind::Pattern(_) | TerminalKind::EndOfText => {
                        first[rule.id.index()].insert(rule.id);
                    }
                }
            }
        }

        let mut sets = Self { first, nullable };
        let mut changed = true;
        while changed {
            changed = false;
            for rule in rules {
                let RuleKind::NonTerminal(rhs) = &rule.kind else {
                    continue;
                };
                let index = rule.id.index();
                for option in 0..rhs.option_count() {
                    let sequence = rhs.option_sequence(option as u32);
                    let (first, nullable) = sets.first_of_sequence(&sequence);
                    let before = sets.first[index].len();
                    sets.first[index].extend(first);
                    if sets.first[index].len() != before {
                        changed = true;
                    }
                    if nullable && !sets.nullable[index] {
                        sets.nullable[index] = true;
                        changed = true;
                    }
                }
            }
        }
        sets
    }

    #[must_use]
    pub fn first(&self, rule: RuleId) -> &BTreeSet<RuleId> {
        &self.first[rule.index()]
    }

    #[must_use]
    pub fn is_nullable(&self, rule: RuleId) -> bool {
        self.nullable[rule.index()]
    }

    /// FIRST set of a sequence of items, and whether the whole sequence can
    /// match nothing.
    #[must_use]
    pub fn first_of_sequence(&self, items: &[RuleId]) -> (BTreeSet<RuleId>, bool) {
        let mut first = BTreeSet::new();
        for item in items {
            first.extend(self.first(*item).iter().copied());
            if !self.is_nullable(*item) {
                return (first, false);
            }
        }
        (first, true)
    }
}
