//! # Errors and Issues
//!
//! Two kinds of failure are kept apart:
//!
//! - **Configuration and programmer errors** are Rust errors:
//!   [`RuleSetError`] when a rule set cannot be built, [`ParserError`] when a
//!   parser is asked for something that does not exist (an unknown goal rule,
//!   a scanner mode the rule set cannot support).
//! - **Scan and parse failures** are [`Issue`]s. They are collected in an
//!   [`IssueHolder`] and returned inside the parse result; the input being
//!   invalid is an expected outcome, not an error.
//!
//! ## Diagnostics Support
//!
//! When the `diagnostics` feature is enabled, the error enums derive
//! [`miette::Diagnostic`].

mod location;

pub use location::{InputLocation, LineIndex, context_excerpt};
pub(crate) use location::floor_char_boundary;

use compact_str::CompactString;
use hashbrown::HashSet;
use thiserror::Error;

#[cfg(feature = "diagnostics")]
use miette::Diagnostic;
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Errors raised while compiling a rule set. They are fatal: the rule set is
/// not usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum RuleSetError {
    #[error("rule '{rule}' references undefined rule '{reference}'")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rule_set::unresolved_reference)))]
    UnresolvedReference {
        rule: CompactString,
        reference: CompactString,
    },

    #[error("rule '{name}' is defined more than once")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rule_set::duplicate_rule)))]
    DuplicateRule { name: CompactString },

    #[error("rule '{rule}' has an illegal multiplicity (min {min}, max {max:?})")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(
            code(rule_set::illegal_multiplicity),
            help("the maximum must be at least one and not below the minimum")
        )
    )]
    IllegalMultiplicity {
        rule: CompactString,
        min: usize,
        max: Option<usize>,
    },

    #[error("rule '{rule}' has an invalid pattern \"{pattern}\": {message}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rule_set::invalid_pattern)))]
    InvalidPattern {
        rule: CompactString,
        pattern: CompactString,
        message: String,
    },

    #[error("rule '{rule}' embeds unknown goal '{goal}' of rule set '{rule_set}'")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rule_set::unknown_embedded_goal)))]
    UnknownEmbeddedGoal {
        rule: CompactString,
        rule_set: CompactString,
        goal: CompactString,
    },

    #[error("skip rule '{rule}' must be a literal or a pattern")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rule_set::skip_not_terminal)))]
    SkipNotTerminal { rule: CompactString },

    #[error("rule '{rule}' has a choice without options")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rule_set::empty_choice)))]
    EmptyChoice { rule: CompactString },

    #[error("rule set '{name}' defines no rules")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rule_set::empty)))]
    EmptyRuleSet { name: CompactString },
}

/// Errors from misusing a [`Parser`](crate::parser::Parser).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum ParserError {
    #[error("rule set '{rule_set}' has no rule named '{name}'")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parser::unknown_goal)))]
    UnknownGoalRule {
        name: CompactString,
        rule_set: CompactString,
    },

    #[error("rule set '{rule_set}' has no non-skip rule to use as the default goal")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parser::no_default_goal)))]
    NoDefaultGoal { rule_set: CompactString },

    #[error("rule set '{rule_set}' embeds other rule sets and cannot be scanned ahead of parsing")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(
            code(parser::classic_scan_unsupported),
            help("use ScannerMode::OnDemand for rule sets with embedded rules")
        )
    )]
    ClassicScanUnsupported { rule_set: CompactString },

    #[error("position {position} is not a character boundary within text of length {len}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parser::invalid_position)))]
    InvalidPosition { position: usize, len: usize },
}

/// Severity of an [`Issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum IssueKind {
    Error,
    Warning,
    Information,
}

/// Processing phase that produced an [`Issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ParsePhase {
    Scan,
    Parse,
}

/// Structured payload attached to an [`Issue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum IssueData {
    /// Terminals that would have been accepted at the failure position, by tag
    Expected {
        expected: Vec<CompactString>,
        context: String,
    },
    /// Options that remain for an ambiguous node
    Ambiguity {
        rule: CompactString,
        options: Vec<u32>,
    },
    /// Terminals that matched the same text during a classic scan
    ScanConflict { terminals: Vec<CompactString> },
}

/// A diagnostic produced while scanning or parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Issue {
    pub kind: IssueKind,
    pub phase: ParsePhase,
    pub location: Option<InputLocation>,
    pub message: String,
    pub data: Option<IssueData>,
}

impl Issue {
    #[must_use]
    pub fn new(
        kind: IssueKind,
        phase: ParsePhase,
        location: Option<InputLocation>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            phase,
            location,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: IssueData) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == IssueKind::Error
    }

    /// Expected terminal tags, when this issue reports a failed match.
    #[must_use]
    pub fn expected(&self) -> Option<&[CompactString]> {
        match &self.data {
            Some(IssueData::Expected { expected, .. }) => Some(expected),
            _ => None,
        }
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            IssueKind::Error => "error",
            IssueKind::Warning => "warning",
            IssueKind::Information => "info",
        };
        let phase = match self.phase {
            ParsePhase::Scan => "scan",
            ParsePhase::Parse => "parse",
        };
        match &self.location {
            Some(location) => write!(f, "{kind} [{phase}] at {location}: {}", self.message),
            None => write!(f, "{kind} [{phase}]: {}", self.message),
        }
    }
}

/// Ordered collection of issues that ignores exact duplicates.
#[derive(Debug, Clone, Default)]
pub struct IssueHolder {
    issues: Vec<Issue>,
    seen: HashSet<Issue, ahash::RandomState>,
}

impl IssueHolder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an issue. Returns `false` if an equal issue was already present.
    pub fn push(&mut self, issue: Issue) -> bool {
        if self.seen.contains(&issue) {
            return false;
        }
        self.seen.insert(issue.clone());
        self.issues.push(issue);
        true
    }

    pub fn error(
        &mut self,
        phase: ParsePhase,
        location: Option<InputLocation>,
        message: impl Into<String>,
        data: Option<IssueData>,
    ) -> bool {
        self.push(Issue {
            data,
            ..Issue::new(IssueKind::Error, phase, location, message)
        })
    }

    pub fn warning(
        &mut self,
        phase: ParsePhase,
        location: Option<InputLocation>,
        message: impl Into<String>,
        data: Option<IssueData>,
    ) -> bool {
        self.push(Issue {
            data,
            ..Issue::new(IssueKind::Warning, phase, location, message)
        })
    }

    pub fn info(
        &mut self,
        phase: ParsePhase,
        location: Option<InputLocation>,
        message: impl Into<String>,
    ) -> bool {
        self.push(Issue::new(IssueKind::Information, phase, location, message))
    }

    pub fn extend(&mut self, other: IssueHolder) {
        for issue in other.issues {
            self.push(issue);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Issue> {
        self.issues.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| issue.is_error())
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(Issue::is_error)
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Issue> {
        self.issues
    }
}

impl<'a> IntoIterator for &'a IssueHolder {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.iter()
    }
}

/// Joins tags as `a, b, or c`.
#[must_use]
pub fn format_expected_list<S: AsRef<str>>(expected: &[S]) -> String {
    match expected {
        [] => "nothing".to_string(),
        [one] => one.as_ref().to_string(),
        [first, second] => format!("{} or {}", first.as_ref(), second.as_ref()),
        [init @ .., last] => {
            let mut result = init
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(", ");
            result.push_str(", or ");
            result.push_str(last.as_ref());
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_holder_suppresses_duplicates() {
        let mut holder = IssueHolder::new();
        let location = Some(InputLocation::new(2, 1, 3, 1));
        assert!(holder.error(ParsePhase::Parse, location, "boom", None));
        assert!(!holder.error(ParsePhase::Parse, location, "boom", None));
        assert!(holder.warning(ParsePhase::Parse, location, "boom", None));
        assert_eq!(holder.len(), 2);
        assert_eq!(holder.errors().count(), 1);
    }

    #[test]
    fn test_issue_holder_keeps_insertion_order() {
        let mut holder = IssueHolder::new();
        holder.info(ParsePhase::Scan, None, "first");
        holder.info(ParsePhase::Scan, None, "second");
        let messages: Vec<_> = holder.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(messages, ["first", "second"]);
    }

    #[test]
    fn test_format_expected_list() {
        assert_eq!(format_expected_list::<&str>(&[]), "nothing");
        assert_eq!(format_expected_list(&["'a'"]), "'a'");
        assert_eq!(format_expected_list(&["'a'", "'b'"]), "'a' or 'b'");
        assert_eq!(format_expected_list(&["'a'", "'b'", "'c'"]), "'a', 'b', or 'c'");
    }

    #[test]
    fn test_issue_display() {
        let issue = Issue::new(
            IssueKind::Error,
            ParsePhase::Parse,
            Some(InputLocation::new(2, 1, 3, 0)),
            "Failed to match {'c'}",
        );
        assert_eq!(issue.to_string(), "error [parse] at 1:3: Failed to match {'c'}");
    }
}
