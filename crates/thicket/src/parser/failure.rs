use crate::automaton::LookaheadSet;
use crate::error::{Issue, IssueData, IssueKind, LineIndex, ParsePhase, context_excerpt};
use crate::rule::{RuleId, RuleSet};
use compact_str::CompactString;
use std::collections::BTreeSet;

/// The furthest position at which a head died, and what it expected there.
#[derive(Debug, Clone, Default)]
pub(crate) struct FailureTracker {
    position: Option<usize>,
    expected: BTreeSet<RuleId>,
    end_of_text: bool,
}

impl FailureTracker {
    /// Keeps the record only if `position` is at least as far as the best so
    /// far; equal positions merge their expectations.
    fn at(&mut self, position: usize) -> bool {
        match self.position {
            Some(best) if best > position => false,
            Some(best) if best == position => true,
            _ => {
                self.position = Some(position);
                self.expected.clear();
                self.end_of_text = false;
                true
            }
        }
    }

    pub(crate) fn expected_terminal(&mut self, position: usize, terminal: RuleId) {
        if self.at(position) {
            self.expected.insert(terminal);
        }
    }

    pub(crate) fn expected_end(&mut self, position: usize) {
        if self.at(position) {
            self.end_of_text = true;
        }
    }

    pub(crate) fn lookahead(&mut self, position: usize, lookahead: &LookaheadSet) {
        if self.at(position) {
            self.expected.extend(lookahead.terminals().iter().copied());
            self.end_of_text |= lookahead.includes_eot();
        }
    }

    /// Furthest position a terminal, lookahead or goal failed at.
    pub(crate) const fn position(&self) -> Option<usize> {
        self.position
    }

    /// Expected tags in sorted order, end of text included.
    pub(crate) fn expected_tags(&self, rule_set: &RuleSet) -> Vec<CompactString> {
        let mut tags: Vec<CompactString> = self
            .expected
            .iter()
            .map(|rule| rule_set.rule(*rule).tag().into())
            .collect();
        if self.end_of_text {
            tags.push(rule_set.rule(rule_set.end_of_text()).tag().into());
        }
        tags.sort();
        tags.dedup();
        tags
    }

    pub(crate) fn to_issue(&self, rule_set: &RuleSet, text: &str) -> Issue {
        let position = self.position().unwrap_or(text.len()).min(text.len());
        let length = text[position..].chars().next().map_or(0, char::len_utf8);
        let location = LineIndex::new(text).location(position, length);
        let expected = self.expected_tags(rule_set);
        let context = context_excerpt(text, position);
        let message = format!("Failed to match {{{}}} at {}", expected.join(", "), context);
        Issue::new(IssueKind::Error, ParsePhase::Parse, Some(location), message)
            .with_data(IssueData::Expected { expected, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleExpr, RuleSetBuilder};

    #[test]
    fn furthest_position_wins() {
        let rules = RuleSetBuilder::new("F")
            .rule("S", RuleExpr::seq([RuleExpr::literal("a"), RuleExpr::literal("b")]))
            .build()
            .unwrap();
        let a = rules.rules().iter().find(|r| r.tag() == "'a'").unwrap().id();
        let b = rules.rules().iter().find(|r| r.tag() == "'b'").unwrap().id();

        let mut failure = FailureTracker::default();
        failure.expected_terminal(0, a);
        failure.expected_terminal(1, b);
        failure.expected_terminal(0, a);
        failure.expected_end(1);
        assert_eq!(failure.position(), Some(1));
        assert_eq!(failure.expected_tags(&rules), ["'b'", "<EOT>"]);

        let issue = failure.to_issue(&rules, "ax");
        assert_eq!(issue.location.map(|l| (l.line, l.column, l.length)), Some((1, 2, 1)));
        assert!(issue.message.starts_with("Failed to match {'b', <EOT>} at "));
    }

    #[test]
    fn missing_position_reports_at_end_of_text() {
        let rules = RuleSetBuilder::new("F")
            .rule("S", RuleExpr::literal("a"))
            .build()
            .unwrap();
        let failure = FailureTracker::default();
        assert_eq!(failure.position(), None);
        let issue = failure.to_issue(&rules, "xy");
        assert_eq!(issue.location.map(|l| (l.line, l.column, l.length)), Some((1, 3, 0)));
    }
}
