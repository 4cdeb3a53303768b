//! # Scanning
//!
//! Terminal recognition for the parse engine. Two strategies are available:
//!
//! - [`ScannerMode::OnDemand`] matches a terminal only when the engine asks
//!   for it at a position. Different heads can see different tokens at the
//!   same position, so no lexer conflict can break a parse.
//! - [`ScannerMode::Classic`] tokenizes the whole text up front by longest
//!   match, like a conventional lexer, and the engine consults the token
//!   stream.
//!
//! Both implement the crate-internal [`Scanner`] trait the engine drives.

mod classic;
mod on_demand;

pub(crate) use classic::{ClassicScanner, ClassicToken, tokenize};
pub(crate) use on_demand::OnDemandScanner;

use crate::error::IssueHolder;
use crate::rule::{RuleId, RuleSet, TerminalKind};
use crate::sppt::EmbeddedTree;
use smallvec::SmallVec;
use std::sync::Arc;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// How terminals are recognized during a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ScannerMode {
    /// Match terminals when a parse head expects them.
    #[default]
    OnDemand,
    /// Tokenize the whole text first by longest match.
    Classic,
}

/// A skip or terminal match, in byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScannedLeaf {
    pub rule: RuleId,
    pub start: usize,
    pub end: usize,
}

/// The skip leaves found at a position and where they end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SkipRun {
    pub leaves: SmallVec<[ScannedLeaf; 2]>,
    pub end: usize,
}

impl SkipRun {
    pub fn empty(at: usize) -> Self {
        Self {
            leaves: SmallVec::new(),
            end: at,
        }
    }
}

/// A matched terminal. Embedded terminals carry the tree of their nested
/// parse.
#[derive(Debug, Clone)]
pub(crate) struct LeafMatch {
    pub end: usize,
    pub embedded: Option<Arc<EmbeddedTree>>,
}

impl LeafMatch {
    pub const fn plain(end: usize) -> Self {
        Self { end, embedded: None }
    }
}

/// Every way a terminal matches at one position; empty when it does not.
pub(crate) type LeafMatches = SmallVec<[LeafMatch; 1]>;

pub(crate) trait Scanner {
    fn text(&self) -> &str;

    /// The longest run of skip terminals starting at `position`.
    fn skip_at(&mut self, position: usize) -> SkipRun;

    /// Matches `terminal` at `position`. Only an embedded terminal can
    /// match with more than one end.
    fn terminal_at(&mut self, position: usize, terminal: RuleId) -> LeafMatches;

    /// Whether `terminal` could start at `position`. Embedded terminals are
    /// assumed to match, so a lookahead check never starts a nested parse.
    fn lookahead_matches(&mut self, position: usize, terminal: RuleId) -> bool;

    /// Issues found while scanning, such as classic lexer conflicts.
    fn take_issues(&mut self) -> IssueHolder;
}

/// Matches a terminal that needs no nested parse. Embedded terminals never
/// match here.
pub(crate) fn match_simple(rule_set: &RuleSet, text: &str, position: usize, terminal: RuleId) -> Option<usize> {
    match rule_set.rule(terminal).terminal()? {
        TerminalKind::Empty => Some(position),
        TerminalKind::Literal(literal) => text
            .get(position..)
            .filter(|rest| rest.starts_with(literal.as_str()))
            .map(|_| position + literal.len()),
        TerminalKind::Pattern(pattern) => pattern.match_at(text, position),
        TerminalKind::EndOfText => (position == text.len()).then_some(position),
        TerminalKind::Embedded { .. } => None,
    }
}

/// Longest skip run from `position`, taking at each step the longest
/// non-empty skip match (lowest rule id on ties).
pub(crate) fn scan_skip(rule_set: &RuleSet, text: &str, position: usize) -> SkipRun {
    let mut run = SkipRun::empty(position);
    loop {
        let at = run.end;
        let best = rule_set
            .skip_terminals()
            .iter()
            .filter_map(|skip| {
                let end = match_simple(rule_set, text, at, *skip)?;
                (end > at).then_some((end, *skip))
            })
            .fold(None, |best: Option<(usize, RuleId)>, (end, rule)| match best {
                Some((best_end, _)) if best_end >= end => best,
                _ => Some((end, rule)),
            });
        let Some((end, rule)) = best else {
            return run;
        };
        run.leaves.push(ScannedLeaf { rule, start: at, end });
        run.end = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleExpr, RuleSetBuilder};

    fn rules() -> Arc<RuleSet> {
        RuleSetBuilder::new("Skip")
            .rule("S", RuleExpr::seq([RuleExpr::literal("class"), RuleExpr::rule("NAME")]))
            .rule("NAME", RuleExpr::pattern("[A-Za-z]+"))
            .skip("WS", RuleExpr::pattern(r"\s+"))
            .skip("COMMENT", RuleExpr::pattern(r"//[^\n]*"))
            .build()
            .unwrap()
    }

    #[test]
    fn skip_run_alternates_terminals() {
        let rules = rules();
        let text = "  // note\n  class";
        let run = scan_skip(&rules, text, 0);
        assert_eq!(run.end, 12);
        let tags: Vec<&str> = run.leaves.iter().map(|l| rules.rule(l.rule).tag()).collect();
        assert_eq!(tags, ["WS", "COMMENT", "WS"]);
    }

    #[test]
    fn simple_matches() {
        let rules = rules();
        let class = rules.rules().iter().find(|r| r.tag() == "'class'").unwrap().id();
        assert_eq!(match_simple(&rules, "class A", 0, class), Some(5));
        assert_eq!(match_simple(&rules, "class A", 1, class), None);
        assert_eq!(match_simple(&rules, "ab", 2, rules.end_of_text()), Some(2));
        assert_eq!(match_simple(&rules, "ab", 1, rules.end_of_text()), None);
    }
}
