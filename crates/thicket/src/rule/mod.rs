//! # Rule Model
//!
//! The compiled form of a grammar. A [`RuleSet`] is built once with a
//! [`RuleSetBuilder`] and then shared (`Arc`) by every parse that uses it.
//!
//! Every rule is either a terminal ([`TerminalKind`]) or a non-terminal whose
//! right-hand side is an [`Rhs`]. Rules are addressed by [`RuleId`], a dense
//! index into the rule set. The builder synthesizes *pseudo* rules for
//! anonymous groups, inline literals and patterns, the empty alternative of
//! optionals and lists, and one goal wrapper per named rule.
//!
//! ```rust
//! use thicket::rule::{RuleExpr, RuleSetBuilder};
//!
//! let rules = RuleSetBuilder::new("Decl")
//!     .rule("S", RuleExpr::seq([RuleExpr::literal("class"), RuleExpr::rule("NAME"), RuleExpr::literal(";")]))
//!     .rule("NAME", RuleExpr::pattern("[A-Za-z]+"))
//!     .skip("WS", RuleExpr::pattern(r"\s+"))
//!     .build()
//!     .unwrap();
//!
//! let s = rules.find_rule("S").unwrap();
//! assert!(rules.rule(s).is_non_terminal());
//! assert_eq!(rules.skip_terminals().len(), 1);
//! ```

mod analysis;
mod builder;
pub mod pattern;
mod validate;

pub use analysis::FirstSets;
pub use builder::{RuleExpr, RuleSetBuilder};
pub use pattern::{PatternEngine, PatternError, PatternMatcher, RegexPatternEngine};

use crate::automaton::{Automaton, AutomatonCache, AutomatonKind};
use compact_str::CompactString;
use hashbrown::HashMap;
use lasso::{RodeoReader, Spur};
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Index of a rule within its [`RuleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct RuleId(u32);

impl RuleId {
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a choice resolves alternatives that cover the same text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ChoiceKind {
    /// Keep the alternatives that match the most input.
    #[default]
    LongestMatch,
    /// Keep the earliest declared option.
    Priority,
    /// Keep every alternative.
    Ambiguous,
}

/// A compiled pattern together with its source.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: CompactString,
    matcher: Arc<dyn PatternMatcher>,
}

impl Pattern {
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn match_at(&self, text: &str, position: usize) -> Option<usize> {
        self.matcher.match_at(text, position)
    }
}

#[derive(Debug, Clone)]
pub enum TerminalKind {
    /// Matches the empty string.
    Empty,
    Literal(CompactString),
    Pattern(Pattern),
    /// Matches only at the end of the text.
    EndOfText,
    /// The goal rule of another rule set, parsed as a single unit.
    Embedded { rule_set: Arc<RuleSet>, goal: RuleId },
}

/// Right-hand side of a non-terminal.
///
/// Options are numbered from zero. Lists and optionals that may match nothing
/// carry their own empty terminal, which forms the last option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rhs {
    Concatenation(Vec<RuleId>),
    Choice {
        kind: ChoiceKind,
        options: Vec<Vec<RuleId>>,
    },
    Optional {
        item: RuleId,
        empty: RuleId,
    },
    List {
        item: RuleId,
        min: usize,
        max: Option<usize>,
        empty: Option<RuleId>,
    },
    SeparatedList {
        item: RuleId,
        separator: RuleId,
        min: usize,
        max: Option<usize>,
        empty: Option<RuleId>,
    },
    /// Wrapper around the rule a parse starts from.
    Goal { item: RuleId },
}

impl Rhs {
    #[must_use]
    pub fn option_count(&self) -> usize {
        match self {
            Self::Concatenation(_) | Self::Goal { .. } => 1,
            Self::Choice { options, .. } => options.len(),
            Self::Optional { .. } => 2,
            Self::List { empty, .. } | Self::SeparatedList { empty, .. } => {
                1 + usize::from(empty.is_some())
            }
        }
    }

    /// Item expected at `position` of `option`.
    ///
    /// List positions follow [`crate::automaton::rule_position`]: position 1
    /// of a list expects another item, positions 1 and 2 of a separated list
    /// expect the separator and the next item.
    #[must_use]
    pub fn item_at(&self, option: u32, position: u32) -> Option<RuleId> {
        let position = position as usize;
        match (self, option) {
            (Self::Concatenation(items), 0) => items.get(position).copied(),
            (Self::Choice { options, .. }, option) => {
                options.get(option as usize)?.get(position).copied()
            }
            (Self::Optional { item, .. }, 0) | (Self::Goal { item }, 0) => {
                (position == 0).then_some(*item)
            }
            (Self::Optional { empty, .. }, 1) => (position == 0).then_some(*empty),
            (Self::List { item, .. }, 0) => (position <= 1).then_some(*item),
            (Self::SeparatedList { item, separator, .. }, 0) => match position {
                0 | 2 => Some(*item),
                1 => Some(*separator),
                _ => None,
            },
            (Self::List { empty, .. } | Self::SeparatedList { empty, .. }, 1) => {
                if position == 0 { *empty } else { None }
            }
            _ => None,
        }
    }

    /// The sequence whose FIRST set is the FIRST set of `option`.
    #[must_use]
    pub fn option_sequence(&self, option: u32) -> SmallVec<[RuleId; 4]> {
        match (self, option) {
            (Self::Concatenation(items), 0) => SmallVec::from_slice(items),
            (Self::Choice { options, .. }, option) => options
                .get(option as usize)
                .map(|items| SmallVec::from_slice(items))
                .unwrap_or_default(),
            (
                Self::Optional { item, .. }
                | Self::Goal { item }
                | Self::List { item, .. }
                | Self::SeparatedList { item, .. },
                0,
            ) => smallvec![*item],
            (Self::Optional { empty, .. }, 1) => smallvec![*empty],
            (Self::List { empty, .. } | Self::SeparatedList { empty, .. }, 1) => {
                empty.iter().copied().collect()
            }
            _ => SmallVec::new(),
        }
    }

    #[must_use]
    pub const fn choice_kind(&self) -> Option<ChoiceKind> {
        match self {
            Self::Choice { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List { .. } | Self::SeparatedList { .. })
    }
}

#[derive(Debug, Clone)]
pub enum RuleKind {
    Terminal(TerminalKind),
    NonTerminal(Rhs),
}

/// A single compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    id: RuleId,
    tag: CompactString,
    kind: RuleKind,
    is_skip: bool,
    is_pseudo: bool,
}

impl Rule {
    #[must_use]
    pub const fn id(&self) -> RuleId {
        self.id
    }

    /// The rule's name, or a synthesized tag such as `'class'` for pseudo
    /// rules.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub const fn kind(&self) -> &RuleKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_skip(&self) -> bool {
        self.is_skip
    }

    #[must_use]
    pub const fn is_pseudo(&self) -> bool {
        self.is_pseudo
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.kind, RuleKind::Terminal(_))
    }

    #[must_use]
    pub const fn is_non_terminal(&self) -> bool {
        matches!(self.kind, RuleKind::NonTerminal(_))
    }

    #[must_use]
    pub const fn is_empty_terminal(&self) -> bool {
        matches!(self.kind, RuleKind::Terminal(TerminalKind::Empty))
    }

    #[must_use]
    pub const fn is_embedded(&self) -> bool {
        matches!(self.kind, RuleKind::Terminal(TerminalKind::Embedded { .. }))
    }

    #[must_use]
    pub const fn is_goal(&self) -> bool {
        matches!(self.kind, RuleKind::NonTerminal(Rhs::Goal { .. }))
    }

    #[must_use]
    pub const fn terminal(&self) -> Option<&TerminalKind> {
        match &self.kind {
            RuleKind::Terminal(kind) => Some(kind),
            RuleKind::NonTerminal(_) => None,
        }
    }

    #[must_use]
    pub const fn rhs(&self) -> Option<&Rhs> {
        match &self.kind {
            RuleKind::NonTerminal(rhs) => Some(rhs),
            RuleKind::Terminal(_) => None,
        }
    }
}

/// An immutable, compiled grammar.
///
/// The rule set also owns the automata built for it, one per
/// (goal rule, [`AutomatonKind`]), so every parser over the same rule set
/// shares them.
pub struct RuleSet {
    name: CompactString,
    rules: Vec<Rule>,
    interner: RodeoReader,
    by_name: HashMap<Spur, RuleId, ahash::RandomState>,
    declared: Vec<RuleId>,
    goals: HashMap<RuleId, RuleId, ahash::RandomState>,
    skip_terminals: Vec<RuleId>,
    non_skip_terminals: Vec<RuleId>,
    end_of_text: RuleId,
    first: FirstSets,
    has_embedded: bool,
    automata: AutomatonCache,
}

impl RuleSet {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a rule by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this rule set.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Finds a named (non-pseudo) rule.
    #[must_use]
    pub fn find_rule(&self, name: &str) -> Option<RuleId> {
        let spur = self.interner.get(name)?;
        self.by_name.get(&spur).copied()
    }

    /// Named rules in declaration order.
    #[must_use]
    pub fn declared_rules(&self) -> &[RuleId] {
        &self.declared
    }

    /// The first declared non-skip rule.
    #[must_use]
    pub fn default_goal(&self) -> Option<RuleId> {
        self.declared
            .iter()
            .copied()
            .find(|id| !self.rule(*id).is_skip())
    }

    /// The goal wrapper of a named rule.
    #[must_use]
    pub fn goal_rule_for(&self, rule: RuleId) -> Option<RuleId> {
        self.goals.get(&rule).copied()
    }

    #[must_use]
    pub fn skip_terminals(&self) -> &[RuleId] {
        &self.skip_terminals
    }

    #[must_use]
    pub fn non_skip_terminals(&self) -> &[RuleId] {
        &self.non_skip_terminals
    }

    #[must_use]
    pub const fn end_of_text(&self) -> RuleId {
        self.end_of_text
    }

    #[must_use]
    pub const fn first_sets(&self) -> &FirstSets {
        &self.first
    }

    /// Whether any terminal embeds another rule set.
    #[must_use]
    pub const fn has_embedded(&self) -> bool {
        self.has_embedded
    }

    /// The automaton for parsing from `goal`, created on first use.
    ///
    /// `goal` is a goal wrapper as returned by [`RuleSet::goal_rule_for`].
    #[must_use]
    pub fn automaton(&self, goal: RuleId, kind: AutomatonKind) -> Arc<Automaton> {
        self.automata.get_or_create(goal, kind)
    }

    /// Number of automata built so far.
    #[must_use]
    pub fn automaton_count(&self) -> usize {
        self.automata.len()
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("name", &self.name)
            .field("rules", &self.rules.len())
            .field("skip_terminals", &self.skip_terminals)
            .finish_non_exhaustive()
    }
}
