use super::{LeafMatch, LeafMatches, ScannedLeaf, Scanner, SkipRun, match_simple};
use crate::error::{IssueData, IssueHolder, LineIndex, ParsePhase, format_expected_list};
use crate::rule::{RuleId, RuleSet, TerminalKind};
use compact_str::CompactString;
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// A token of a classic scan. Several rules share a token when they match
/// the same text with equal priority; unrecognized text has no rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClassicToken {
    pub rules: SmallVec<[RuleId; 2]>,
    pub start: usize,
    pub end: usize,
}

/// Splits `text` into tokens by longest match. On equal length, literals
/// win over patterns; rules of the same kind stay together on the token.
pub(crate) fn tokenize(rule_set: &RuleSet, text: &str) -> (Vec<ClassicToken>, IssueHolder) {
    let candidates: Vec<(RuleId, bool)> = rule_set
        .rules()
        .iter()
        .filter_map(|rule| match rule.terminal()? {
            TerminalKind::Literal(_) => Some((rule.id(), true)),
            TerminalKind::Pattern(_) => Some((rule.id(), false)),
            _ => None,
        })
        .collect();

    let index = LineIndex::new(text);
    let mut issues = IssueHolder::new();
    let mut tokens: Vec<ClassicToken> = Vec::new();
    let mut position = 0;

    while position < text.len() {
        let mut best_end = position;
        let mut best: SmallVec<[(RuleId, bool); 2]> = SmallVec::new();
        for (rule, is_literal) in &candidates {
            let Some(end) = match_simple(rule_set, text, position, *rule) else {
                continue;
            };
            if end > best_end {
                best_end = end;
                best.clear();
            }
            if end == best_end && end > position {
                best.push((*rule, *is_literal));
            }
        }

        if best.is_empty() {
            let width = text[position..].chars().next().map_or(1, char::len_utf8);
            match tokens.last_mut() {
                Some(last) if last.rules.is_empty() && last.end == position => last.end += width,
                _ => tokens.push(ClassicToken {
                    rules: SmallVec::new(),
                    start: position,
                    end: position + width,
                }),
            }
            position += width;
            continue;
        }

        if best.iter().any(|(_, is_literal)| *is_literal) {
            best.retain(|(_, is_literal)| *is_literal);
        } else if best.len() > 1 {
            let terminals: Vec<CompactString> =
                best.iter().map(|(rule, _)| rule_set.rule(*rule).tag().into()).collect();
            issues.warning(
                ParsePhase::Scan,
                Some(index.location(position, best_end - position)),
                format!(
                    "'{}' is matched by {}",
                    &text[position..best_end],
                    format_expected_list(&terminals)
                ),
                Some(IssueData::ScanConflict { terminals }),
            );
        }
        tokens.push(ClassicToken {
            rules: best.iter().map(|(rule, _)| *rule).collect(),
            start: position,
            end: best_end,
        });
        position = best_end;
    }

    for token in tokens.iter().filter(|token| token.rules.is_empty()) {
        issues.error(
            ParsePhase::Scan,
            Some(index.location(token.start, token.end - token.start)),
            format!("Unrecognized text '{}'", &text[token.start..token.end]),
            None,
        );
    }
    log::trace!("classic scan of {} bytes: {} tokens", text.len(), tokens.len());
    (tokens, issues)
}

/// Serves the engine from a token stream computed before parsing.
pub(crate) struct ClassicScanner<'t> {
    rule_set: Arc<RuleSet>,
    text: &'t str,
    tokens: Vec<ClassicToken>,
    by_start: HashMap<usize, usize, ahash::RandomState>,
    issues: IssueHolder,
}

impl<'t> ClassicScanner<'t> {
    pub(crate) fn new(rule_set: Arc<RuleSet>, text: &'t str) -> Self {
        let (tokens, issues) = tokenize(&rule_set, text);
        let by_start = tokens
            .iter()
            .enumerate()
            .map(|(index, token)| (token.start, index))
            .collect();
        Self {
            rule_set,
            text,
            tokens,
            by_start,
            issues,
        }
    }

    fn token_at(&self, position: usize) -> Option<&ClassicToken> {
        self.by_start.get(&position).map(|index| &self.tokens[*index])
    }

    fn is_skip(&self, token: &ClassicToken) -> bool {
        token
            .rules
            .iter()
            .any(|rule| self.rule_set.rule(*rule).is_skip())
    }
}

impl Scanner for ClassicScanner<'_> {
    fn text(&self) -> &str {
        self.text
    }

    fn skip_at(&mut self, position: usize) -> SkipRun {
        let mut run = SkipRun::empty(position);
        while let Some(token) = self.token_at(run.end) {
            if !self.is_skip(token) {
                break;
            }
            let Some(rule) = token
                .rules
                .iter()
                .copied()
                .find(|rule| self.rule_set.rule(*rule).is_skip())
            else {
                break;
            };
            let leaf = ScannedLeaf {
                rule,
                start: token.start,
                end: token.end,
            };
            run.leaves.push(leaf);
            run.end = leaf.end;
        }
        run
    }

    fn terminal_at(&mut self, position: usize, terminal: RuleId) -> LeafMatches {
        let end = match self.rule_set.rule(terminal).terminal() {
            None => None,
            Some(TerminalKind::Empty | TerminalKind::EndOfText) => {
                match_simple(&self.rule_set, self.text, position, terminal)
            }
            Some(_) => self
                .token_at(position)
                .filter(|token| token.rules.contains(&terminal))
                .map(|token| token.end),
        };
        end.map(LeafMatch::plain).into_iter().collect()
    }

    fn lookahead_matches(&mut self, position: usize, terminal: RuleId) -> bool {
        !self.terminal_at(position, terminal).is_empty()
    }

    fn take_issues(&mut self) -> IssueHolder {
        std::mem::take(&mut self.issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IssueKind;
    use crate::rule::{RuleExpr, RuleSetBuilder};

    fn keywords() -> Arc<RuleSet> {
        RuleSetBuilder::new("Keywords")
            .rule(
                "S",
                RuleExpr::many(RuleExpr::longest([RuleExpr::literal("if"), RuleExpr::rule("ID")])),
            )
            .rule("ID", RuleExpr::pattern("[a-z]+"))
            .skip("WS", RuleExpr::pattern(" +"))
            .build()
            .unwrap()
    }

    #[test]
    fn literal_wins_tie_and_longest_wins_overall() {
        let rules = keywords();
        let (tokens, issues) = tokenize(&rules, "if iffy");
        assert!(issues.is_empty());
        let tags: Vec<&str> = tokens
            .iter()
            .map(|t| rules.rule(t.rules[0]).tag())
            .collect();
        assert_eq!(tags, ["'if'", "WS", "ID"]);
        assert_eq!((tokens[2].start, tokens[2].end), (3, 7));
    }

    #[test]
    fn unrecognized_text_is_grouped() {
        let rules = keywords();
        let (tokens, issues) = tokenize(&rules, "ab ##c");
        assert_eq!(tokens.len(), 4);
        assert!(tokens[2].rules.is_empty());
        assert_eq!((tokens[2].start, tokens[2].end), (3, 5));
        let errors: Vec<_> = issues.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].location.map(|l| l.column), Some(4));
    }

    #[test]
    fn tied_patterns_warn() {
        let rules = RuleSetBuilder::new("Tie")
            .rule("S", RuleExpr::choice(Default::default(), [RuleExpr::rule("A"), RuleExpr::rule("B")]))
            .rule("A", RuleExpr::pattern("[a-z]+"))
            .rule("B", RuleExpr::pattern("[a-c]+"))
            .build()
            .unwrap();
        let (tokens, issues) = tokenize(&rules, "abc");
        assert_eq!(tokens[0].rules.len(), 2);
        let warning = issues.iter().next().unwrap();
        assert_eq!(warning.kind, IssueKind::Warning);
        assert!(matches!(warning.data, Some(IssueData::ScanConflict { .. })));
    }
}
