//! # Parsing
//!
//! [`Parser`] runs the graph-structured-stack engine over a [`RuleSet`]. A
//! parse explores every viable derivation in one pass over the text, one
//! input position (level) at a time, merging partial parses that reached the
//! same automaton state over the same span. Successful parses are frozen
//! into an [`Sppt`]; failures are reported as [`Issue`](crate::error::Issue)s
//! naming the furthest position reached and what was expected there.
//!
//! ```rust
//! use thicket::parser::{ParseOptions, ParseStatus, Parser};
//! use thicket::rule::{RuleExpr, RuleSetBuilder};
//!
//! let rules = RuleSetBuilder::new("Greeting")
//!     .rule("S", RuleExpr::seq([RuleExpr::literal("hello"), RuleExpr::rule("NAME")]))
//!     .rule("NAME", RuleExpr::pattern("[a-z]+"))
//!     .skip("WS", RuleExpr::pattern(r"\s+"))
//!     .build()
//!     .unwrap();
//!
//! let parser = Parser::new(rules);
//! let result = parser.parse("hello world", &ParseOptions::default()).unwrap();
//! assert_eq!(result.status, ParseStatus::Success);
//! assert_eq!(result.sppt.unwrap().to_text(), "hello world");
//! ```

mod engine;
mod failure;
mod freeze;
mod interrupt;
mod stack;

pub use interrupt::InterruptHandle;

pub(crate) use engine::parse_embedded;
pub(crate) use interrupt::InterruptState;

use crate::automaton::{Automaton, AutomatonKind};
use crate::error::{IssueHolder, ParserError};
use crate::rule::{RuleId, RuleSet};
use crate::scanner::{ClassicScanner, OnDemandScanner, Scanner, ScannerMode, tokenize};
use crate::sppt::{LeafToken, Sppt};
use compact_str::CompactString;
use engine::{EngineConfig, GoalMode};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Options for a single parse.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Rule to parse; the first declared non-skip rule when `None`
    pub goal_rule_name: Option<CompactString>,
    /// Add an error issue when the parse fails
    pub report_errors: bool,
    /// Add a warning issue for every ambiguous node of the result
    pub report_ambiguities: bool,
    /// Remember skip runs per position for the duration of the parse
    pub cache_skip: bool,
    pub scanner_mode: ScannerMode,
    pub automaton_kind: AutomatonKind,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            goal_rule_name: None,
            report_errors: true,
            report_ambiguities: false,
            cache_skip: true,
            scanner_mode: ScannerMode::OnDemand,
            automaton_kind: AutomatonKind::default(),
        }
    }
}

impl ParseOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn goal(mut self, name: impl Into<CompactString>) -> Self {
        self.goal_rule_name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn report_errors(mut self, report: bool) -> Self {
        self.report_errors = report;
        self
    }

    #[must_use]
    pub const fn report_ambiguities(mut self, report: bool) -> Self {
        self.report_ambiguities = report;
        self
    }

    #[must_use]
    pub const fn cache_skip(mut self, cache: bool) -> Self {
        self.cache_skip = cache;
        self
    }

    #[must_use]
    pub const fn scanner_mode(mut self, mode: ScannerMode) -> Self {
        self.scanner_mode = mode;
        self
    }

    #[must_use]
    pub const fn automaton_kind(mut self, kind: AutomatonKind) -> Self {
        self.automaton_kind = kind;
        self
    }
}

/// How a parse ended.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ParseStatus {
    Success,
    Failure,
    Interrupted { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ParseMetrics {
    /// Growing nodes created in the stack
    pub growing_nodes: usize,
    /// Input positions processed
    pub levels: usize,
    /// Terminal matches turned into leaves
    pub leaves: usize,
    pub parse_time: Duration,
}

/// Outcome of [`Parser::parse`].
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// The forest, present exactly when `status` is [`ParseStatus::Success`]
    pub sppt: Option<Sppt>,
    pub issues: IssueHolder,
    pub status: ParseStatus,
    pub metrics: ParseMetrics,
}

impl ParseResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ParseStatus::Success
    }
}

/// A live parse head at a completion position.
///
/// `elements` is the chain of rules being parsed, innermost first, and
/// `next_child_number` the index of the child the innermost rule expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Spine {
    pub expected_next: BTreeSet<RuleId>,
    pub elements: Vec<RuleId>,
    pub next_child_number: usize,
}

/// Tokens of a classic scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub tokens: Vec<LeafToken>,
    pub issues: IssueHolder,
}

/// Settings shared by a parse and the nested parses of embedded terminals.
#[derive(Debug, Clone)]
pub(crate) struct ParseContext {
    pub interrupt: Arc<InterruptState>,
    pub cache_skip: bool,
    pub automaton_kind: AutomatonKind,
    /// Set for the parse of an embedded terminal.
    pub nested: bool,
}

impl Default for ParseContext {
    fn default() -> Self {
        Self {
            interrupt: Arc::default(),
            cache_skip: true,
            automaton_kind: AutomatonKind::default(),
            nested: false,
        }
    }
}

/// Parses texts with one rule set.
///
/// Parsers are cheap to clone; clones share the rule set (and with it the
/// automata built so far) and the interrupt flag.
#[derive(Debug, Clone)]
pub struct Parser {
    rule_set: Arc<RuleSet>,
    interrupt: Arc<InterruptState>,
}

impl Parser {
    #[must_use]
    pub fn new(rule_set: Arc<RuleSet>) -> Self {
        Self {
            rule_set,
            interrupt: Arc::default(),
        }
    }

    #[must_use]
    pub fn rule_set(&self) -> &Arc<RuleSet> {
        &self.rule_set
    }

    /// Goal wrapper of the named rule, or of the default goal.
    fn goal_for(&self, name: Option<&str>) -> Result<RuleId, ParserError> {
        let rule = match name {
            Some(name) => self
                .rule_set
                .find_rule(name)
                .ok_or_else(|| ParserError::UnknownGoalRule {
                    name: name.into(),
                    rule_set: self.rule_set.name().into(),
                })?,
            None => self
                .rule_set
                .default_goal()
                .ok_or_else(|| ParserError::NoDefaultGoal {
                    rule_set: self.rule_set.name().into(),
                })?,
        };
        self.rule_set
            .goal_rule_for(rule)
            .ok_or_else(|| ParserError::UnknownGoalRule {
                name: self.rule_set.rule(rule).tag().into(),
                rule_set: self.rule_set.name().into(),
            })
    }

    fn context(&self, options: &ParseOptions) -> ParseContext {
        ParseContext {
            interrupt: Arc::clone(&self.interrupt),
            cache_skip: options.cache_skip,
            automaton_kind: options.automaton_kind,
            nested: false,
        }
    }

    fn scanner<'t>(
        &self,
        text: &'t str,
        options: &ParseOptions,
    ) -> Result<Box<dyn Scanner + 't>, ParserError> {
        match options.scanner_mode {
            ScannerMode::OnDemand => Ok(Box::new(OnDemandScanner::new(
                Arc::clone(&self.rule_set),
                text,
                self.context(options),
            ))),
            ScannerMode::Classic if self.rule_set.has_embedded() => Err(ParserError::ClassicScanUnsupported {
                rule_set: self.rule_set.name().into(),
            }),
            ScannerMode::Classic => Ok(Box::new(ClassicScanner::new(Arc::clone(&self.rule_set), text))),
        }
    }

    /// Builds the whole automaton for `goal` ahead of parsing.
    ///
    /// # Errors
    ///
    /// Returns [`ParserError::UnknownGoalRule`] if the rule set has no rule
    /// named `goal`.
    pub fn build_for(&self, goal: &str, kind: AutomatonKind) -> Result<Arc<Automaton>, ParserError> {
        let goal = self.goal_for(Some(goal))?;
        let automaton = self.rule_set.automaton(goal, kind);
        automaton.build(&self.rule_set);
        Ok(automaton)
    }

    /// Parses `text` from the named rule with default options.
    ///
    /// # Errors
    ///
    /// Returns [`ParserError::UnknownGoalRule`] if the rule set has no rule
    /// named `goal`.
    pub fn parse_for_goal(&self, goal: &str, text: &str) -> Result<ParseResult, ParserError> {
        self.parse(text, &ParseOptions::default().goal(goal))
    }

    /// Parses `text`.
    ///
    /// A text that does not match is not an error: the result then has no
    /// forest and carries the failure as an issue.
    ///
    /// # Errors
    ///
    /// Returns a [`ParserError`] when the goal rule does not exist or the
    /// scanner mode cannot be used with this rule set.
    pub fn parse(&self, text: &str, options: &ParseOptions) -> Result<ParseResult, ParserError> {
        let goal = self.goal_for(options.goal_rule_name.as_deref())?;
        let mut scanner = self.scanner(text, options)?;
        let automaton = self.rule_set.automaton(goal, options.automaton_kind);
        let context = self.context(options);
        let started = Instant::now();
        log::debug!(
            "parsing {} bytes of '{}' from {}",
            text.len(),
            self.rule_set.name(),
            self.rule_set.rule(goal).tag()
        );

        let outcome = engine::run(
            &self.rule_set,
            &automaton,
            scanner.as_mut(),
            &EngineConfig {
                goal,
                start: 0,
                mode: GoalMode::EndOfText,
                limit: None,
            },
            &context,
        );
        let mut issues = scanner.take_issues();
        let mut metrics = ParseMetrics {
            growing_nodes: outcome.stack.len(),
            levels: outcome.levels,
            leaves: outcome.leaves,
            parse_time: Duration::ZERO,
        };

        let (sppt, status) = if let Some(reason) = outcome.interrupted.clone() {
            log::debug!("parse interrupted: {reason}");
            (None, ParseStatus::Interrupted { reason })
        } else if let Some(tree) = freeze::freeze(&self.rule_set, text, &outcome, options.report_ambiguities, &mut issues) {
            let sppt = Sppt::new(Arc::clone(&self.rule_set), Arc::from(text), tree);
            (Some(sppt), ParseStatus::Success)
        } else {
            if options.report_errors {
                issues.push(outcome.failure.to_issue(&self.rule_set, text));
            }
            (None, ParseStatus::Failure)
        };

        metrics.parse_time = started.elapsed();
        log::debug!(
            "parse finished: {:?}, {} growing nodes over {} levels in {:?}",
            status,
            metrics.growing_nodes,
            metrics.levels,
            metrics.parse_time
        );
        Ok(ParseResult {
            sppt,
            issues,
            status,
            metrics,
        })
    }

    /// Live parse heads at `position`, found by parsing the text before it.
    ///
    /// # Errors
    ///
    /// Returns [`ParserError::InvalidPosition`] if `position` is past the end
    /// of `text` or inside a character, and the errors of [`Parser::parse`].
    pub fn expected_at(
        &self,
        text: &str,
        position: usize,
        options: &ParseOptions,
    ) -> Result<BTreeSet<Spine>, ParserError> {
        if !text.is_char_boundary(position) {
            return Err(ParserError::InvalidPosition {
                position,
                len: text.len(),
            });
        }
        let goal = self.goal_for(options.goal_rule_name.as_deref())?;
        let prefix = &text[..position];
        let mut scanner = self.scanner(prefix, options)?;
        let automaton = self.rule_set.automaton(goal, options.automaton_kind);
        let outcome = engine::run(
            &self.rule_set,
            &automaton,
            scanner.as_mut(),
            &EngineConfig {
                goal,
                start: 0,
                mode: GoalMode::EndOfText,
                limit: Some(position),
            },
            &self.context(options),
        );
        Ok(engine::spines(&self.rule_set, &automaton, &outcome, position))
    }

    /// Terminals that could be typed at `position`.
    ///
    /// # Errors
    ///
    /// As [`Parser::expected_at`].
    pub fn expected_terminals_at(
        &self,
        text: &str,
        position: usize,
        options: &ParseOptions,
    ) -> Result<BTreeSet<RuleId>, ParserError> {
        Ok(self
            .expected_at(text, position, options)?
            .into_iter()
            .flat_map(|spine| spine.expected_next)
            .collect())
    }

    /// Tokenizes `text` by longest match, without parsing.
    ///
    /// # Errors
    ///
    /// Returns [`ParserError::ClassicScanUnsupported`] when the rule set
    /// embeds other rule sets.
    pub fn scan(&self, text: &str) -> Result<ScanResult, ParserError> {
        if self.rule_set.has_embedded() {
            return Err(ParserError::ClassicScanUnsupported {
                rule_set: self.rule_set.name().into(),
            });
        }
        let (tokens, issues) = tokenize(&self.rule_set, text);
        let index = crate::error::LineIndex::new(text);
        let tokens = tokens
            .into_iter()
            .map(|token| {
                let rule = token.rules.first().copied();
                let (tag, is_skip) = rule.map_or(("<UNKNOWN>", false), |rule| {
                    let rule = self.rule_set.rule(rule);
                    (rule.tag(), rule.is_skip())
                });
                LeafToken::new(
                    rule,
                    tag,
                    is_skip,
                    index.location(token.start, token.end - token.start),
                    &text[token.start..token.end],
                )
            })
            .collect();
        Ok(ScanResult { tokens, issues })
    }

    /// Asks the running parses to stop. Without a running parse the
    /// request is dropped.
    pub fn interrupt(&self, reason: &str) {
        self.interrupt_handle().interrupt(reason);
    }

    /// A handle that can interrupt this parser from another thread.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle::new(Arc::clone(&self.interrupt))
    }
}
