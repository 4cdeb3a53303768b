//! # Automaton
//!
//! Parser states and transitions for one goal rule, built on demand while
//! parsing or eagerly with [`Automaton::build`].
//!
//! A state is a set of [`RulePosition`]s of one rule. Transitions are keyed by
//! their source state and, for complete states, the state of the previous
//! stack node:
//!
//! | source state      | previous | actions            |
//! |-------------------|----------|--------------------|
//! | incomplete        | ignored  | `Width`            |
//! | complete goal     | none     | `Goal`             |
//! | complete          | some     | `Height`, `Graft`  |
//!
//! Both `Height` and `Graft` are offered when both apply. The engine merges
//! whatever duplicates that produces.
//!
//! Automata live in their rule set's cache, so every parser over the same rule
//! set shares them. Building the same automaton eagerly or by parsing a
//! sufficient set of sentences gives the same states and transitions:
//!
//! ```rust
//! use thicket::automaton::AutomatonKind;
//! use thicket::parser::Parser;
//! use thicket::rule::{RuleExpr, RuleSetBuilder};
//!
//! let rules = RuleSetBuilder::new("Abc")
//!     .rule("S", RuleExpr::seq([RuleExpr::literal("a"), RuleExpr::literal("b")]))
//!     .build()
//!     .unwrap();
//! let parser = Parser::new(rules);
//! let automaton = parser.build_for("S", AutomatonKind::LookaheadOne).unwrap();
//! assert!(automaton.state_count() > 2);
//! ```

mod builder;
pub mod lookahead;
pub mod rule_position;
mod state;
mod transition;

pub use lookahead::LookaheadSet;
pub use rule_position::RulePosition;
pub use state::{ParserState, StateId};
pub use transition::{ParseAction, RuntimeGuard, Transition};

use crate::rule::{RuleId, RuleSet};
use builder::AutomatonInner;
use hashbrown::HashMap;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Lookahead strategy of an automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum AutomatonKind {
    /// One terminal of lookahead, checked after every step.
    #[default]
    LookaheadOne,
}

/// States and transitions for parsing from one goal rule.
#[derive(Debug)]
pub struct Automaton {
    goal: RuleId,
    kind: AutomatonKind,
    inner: RwLock<AutomatonInner>,
}

impl Automaton {
    pub(crate) fn new(goal: RuleId, kind: AutomatonKind) -> Self {
        Self {
            goal,
            kind,
            inner: RwLock::new(AutomatonInner::new(goal)),
        }
    }

    /// The goal wrapper rule.
    #[must_use]
    pub const fn goal(&self) -> RuleId {
        self.goal
    }

    #[must_use]
    pub const fn kind(&self) -> AutomatonKind {
        self.kind
    }

    /// The state a parse starts in: the goal rule before its item.
    #[must_use]
    pub const fn start_state(&self) -> StateId {
        StateId::new(0)
    }

    /// # Panics
    ///
    /// Panics if `id` was not created by this automaton.
    #[must_use]
    pub fn state(&self, id: StateId) -> ParserState {
        self.read().states[id.index()].clone()
    }

    #[must_use]
    pub fn state_count(&self) -> usize {
        self.read().states.len()
    }

    #[must_use]
    pub fn transition_count(&self) -> usize {
        self.read().transitions.values().map(|t| t.len()).sum()
    }

    /// Whether [`Automaton::build`] has run.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.read().built
    }

    /// Transitions out of `from` when the previous stack node is in
    /// `previous`. Computed on first request and cached.
    pub fn transitions(
        &self,
        rule_set: &RuleSet,
        from: StateId,
        previous: Option<StateId>,
    ) -> Arc<[Transition]> {
        {
            let inner = self.read();
            let key = inner.key(from, previous);
            if let Some(transitions) = inner.transitions.get(&key) {
                return Arc::clone(transitions);
            }
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.transitions_for(rule_set, from, previous)
    }

    /// Builds every state and transition reachable from the start state.
    pub fn build(&self, rule_set: &RuleSet) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.built {
            inner.build(rule_set);
        }
    }

    /// Comparable view of the states and transitions built so far.
    #[must_use]
    pub fn snapshot(&self) -> AutomatonSnapshot {
        let inner = self.read();
        let positions = |id: StateId| inner.states[id.index()].rule_positions().to_vec();
        let states = inner
            .states
            .iter()
            .map(|state| state.rule_positions().to_vec())
            .collect();
        let transitions = inner
            .transitions
            .iter()
            .flat_map(|((from, previous), transitions)| {
                transitions.iter().map(move |t| TransitionSnapshot {
                    from: positions(*from),
                    previous: previous.map(positions),
                    action: t.action,
                    to: positions(t.to),
                    guard: t.guard,
                    lookahead: t.lookahead.clone(),
                })
            })
            .collect();
        AutomatonSnapshot {
            states,
            transitions,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, AutomatonInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A transition described by rule positions instead of state numbers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransitionSnapshot {
    pub from: Vec<RulePosition>,
    pub previous: Option<Vec<RulePosition>>,
    pub action: ParseAction,
    pub to: Vec<RulePosition>,
    pub guard: RuntimeGuard,
    pub lookahead: LookaheadSet,
}

/// States and transitions of an automaton, independent of state numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomatonSnapshot {
    states: BTreeSet<Vec<RulePosition>>,
    transitions: BTreeSet<TransitionSnapshot>,
}

impl AutomatonSnapshot {
    #[must_use]
    pub const fn states(&self) -> &BTreeSet<Vec<RulePosition>> {
        &self.states
    }

    #[must_use]
    pub const fn transitions(&self) -> &BTreeSet<TransitionSnapshot> {
        &self.transitions
    }

    /// Same states and same transitions, ignoring lookahead content when
    /// `no_lookahead_compare` is set.
    #[must_use]
    pub fn matches(&self, other: &Self, no_lookahead_compare: bool) -> bool {
        self.states == other.states
            && self.comparable(no_lookahead_compare) == other.comparable(no_lookahead_compare)
    }

    /// Whether every state and transition here also exists in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self, no_lookahead_compare: bool) -> bool {
        self.states.is_subset(&other.states)
            && self
                .comparable(no_lookahead_compare)
                .is_subset(&other.comparable(no_lookahead_compare))
    }

    fn comparable(&self, no_lookahead_compare: bool) -> BTreeSet<TransitionSnapshot> {
        if !no_lookahead_compare {
            return self.transitions.clone();
        }
        self.transitions
            .iter()
            .map(|t| TransitionSnapshot {
                lookahead: LookaheadSet::empty(),
                ..t.clone()
            })
            .collect()
    }
}

/// Automata of one rule set keyed by (goal, kind).
#[derive(Debug, Default)]
pub(crate) struct AutomatonCache {
    automata: RwLock<HashMap<(RuleId, AutomatonKind), Arc<Automaton>, ahash::RandomState>>,
}

impl AutomatonCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get_or_create(&self, goal: RuleId, kind: AutomatonKind) -> Arc<Automaton> {
        if let Some(automaton) = self
            .automata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(goal, kind))
        {
            return Arc::clone(automaton);
        }
        let mut automata = self.automata.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            automata
                .entry((goal, kind))
                .or_insert_with(|| Arc::new(Automaton::new(goal, kind))),
        )
    }

    pub(crate) fn len(&self) -> usize {
        self.automata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
