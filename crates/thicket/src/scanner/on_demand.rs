use super::{LeafMatch, LeafMatches, Scanner, SkipRun, match_simple, scan_skip};
use crate::error::IssueHolder;
use crate::parser::{ParseContext, parse_embedded};
use crate::rule::{RuleId, RuleSet, TerminalKind};
use hashbrown::HashMap;
use std::sync::Arc;

/// Matches terminals as the engine asks for them, caching every answer for
/// the duration of one parse.
pub(crate) struct OnDemandScanner<'t> {
    rule_set: Arc<RuleSet>,
    text: &'t str,
    context: ParseContext,
    matches: HashMap<(usize, RuleId), LeafMatches, ahash::RandomState>,
    skips: HashMap<usize, SkipRun, ahash::RandomState>,
}

impl<'t> OnDemandScanner<'t> {
    pub(crate) fn new(rule_set: Arc<RuleSet>, text: &'t str, context: ParseContext) -> Self {
        Self {
            rule_set,
            text,
            context,
            matches: HashMap::default(),
            skips: HashMap::default(),
        }
    }

    fn scan(&self, position: usize, terminal: RuleId) -> LeafMatches {
        match self.rule_set.rule(terminal).terminal() {
            Some(TerminalKind::Embedded { rule_set, goal }) => {
                parse_embedded(rule_set, *goal, self.text, position, &self.context)
                    .into_iter()
                    .map(|(end, tree)| LeafMatch {
                        end,
                        embedded: Some(tree),
                    })
                    .collect()
            }
            _ => match_simple(&self.rule_set, self.text, position, terminal)
                .map(LeafMatch::plain)
                .into_iter()
                .collect(),
        }
    }
}

impl Scanner for OnDemandScanner<'_> {
    fn text(&self) -> &str {
        self.text
    }

    fn skip_at(&mut self, position: usize) -> SkipRun {
        if !self.context.cache_skip {
            return scan_skip(&self.rule_set, self.text, position);
        }
        if let Some(run) = self.skips.get(&position) {
            return run.clone();
        }
        let run = scan_skip(&self.rule_set, self.text, position);
        self.skips.insert(position, run.clone());
        run
    }

    fn terminal_at(&mut self, position: usize, terminal: RuleId) -> LeafMatches {
        if let Some(found) = self.matches.get(&(position, terminal)) {
            return found.clone();
        }
        let found = self.scan(position, terminal);
        self.matches.insert((position, terminal), found.clone());
        found
    }

    fn lookahead_matches(&mut self, position: usize, terminal: RuleId) -> bool {
        if self.rule_set.rule(terminal).is_embedded() {
            return true;
        }
        if let Some(found) = self.matches.get(&(position, terminal)) {
            return !found.is_empty();
        }
        !self.terminal_at(position, terminal).is_empty()
    }

    fn take_issues(&mut self) -> IssueHolder {
        // nested parse failures are reported as a non-match, not as issues
        IssueHolder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleExpr, RuleSetBuilder};

    #[test]
    fn caches_terminal_matches() {
        let rules = RuleSetBuilder::new("Cache")
            .rule("S", RuleExpr::rule("NUM"))
            .rule("NUM", RuleExpr::pattern("[0-9]+"))
            .build()
            .unwrap();
        let num = rules.find_rule("NUM").unwrap();
        let mut scanner = OnDemandScanner::new(Arc::clone(&rules), "12a", ParseContext::default());
        assert_eq!(scanner.terminal_at(0, num).first().map(|m| m.end), Some(2));
        assert!(scanner.terminal_at(2, num).is_empty());
        assert!(scanner.lookahead_matches(1, num));
        assert_eq!(scanner.matches.len(), 3);
    }
}
