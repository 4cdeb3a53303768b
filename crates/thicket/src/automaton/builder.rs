//! State and transition construction.

use super::lookahead::LookaheadSet;
use super::rule_position::RulePosition;
use super::state::{ParserState, StateId};
use super::transition::{ParseAction, RuntimeGuard, Transition};
use crate::rule::{RuleId, RuleSet};
use hashbrown::{HashMap, HashSet};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

type TransitionKey = (StateId, Option<StateId>);

#[derive(Debug)]
pub(super) struct AutomatonInner {
    goal: RuleId,
    pub(super) states: Vec<ParserState>,
    by_positions: HashMap<Vec<RulePosition>, StateId, ahash::RandomState>,
    pub(super) transitions: HashMap<TransitionKey, Arc<[Transition]>, ahash::RandomState>,
    pub(super) built: bool,
}

/// Rule positions entered at the start of a rule, reachable from the items a
/// state expects through first items.
struct Closure {
    entries: BTreeSet<RulePosition>,
}

impl AutomatonInner {
    pub(super) fn new(goal: RuleId) -> Self {
        let mut inner = Self {
            goal,
            states: Vec::new(),
            by_positions: HashMap::default(),
            transitions: HashMap::default(),
            built: false,
        };
        inner.state_for(vec![RulePosition::start(goal, 0)]);
        inner
    }

    /// Widths do not depend on the previous state, and the goal is only ever
    /// complete without one.
    pub(super) fn key(&self, from: StateId, previous: Option<StateId>) -> TransitionKey {
        if self.states[from.index()].is_complete() {
            (from, previous)
        } else {
            (from, None)
        }
    }

    fn state_for(&mut self, mut positions: Vec<RulePosition>) -> StateId {
        positions.sort_unstable();
        positions.dedup();
        if let Some(id) = self.by_positions.get(&positions) {
            return *id;
        }
        let id = StateId::new(u32::try_from(self.states.len()).unwrap_or(u32::MAX));
        self.states.push(ParserState::new(id, positions.clone()));
        self.by_positions.insert(positions, id);
        id
    }

    pub(super) fn transitions_for(
        &mut self,
        rule_set: &RuleSet,
        from: StateId,
        previous: Option<StateId>,
    ) -> Arc<[Transition]> {
        let key = self.key(from, previous);
        if let Some(transitions) = self.transitions.get(&key) {
            return Arc::clone(transitions);
        }
        let state = self.states[from.index()].clone();
        let transitions: Arc<[Transition]> = if !state.is_complete() {
            self.widths(rule_set, &state).into()
        } else if state.rule() == self.goal {
            Arc::new([Transition {
                from,
                to: from,
                to_rule: self.goal,
                to_complete: true,
                action: ParseAction::Goal,
                lookahead: LookaheadSet::end_of_text(),
                guard: RuntimeGuard::None,
            }])
        } else if let Some(previous) = key.1 {
            let previous = self.states[previous.index()].clone();
            self.heights_and_grafts(rule_set, &state, &previous).into()
        } else {
            Arc::new([])
        };
        log::trace!(
            "automaton {}: {} transitions from {} (previous {:?})",
            rule_set.rule(self.goal).tag(),
            transitions.len(),
            state,
            key.1
        );
        self.transitions.insert(key, Arc::clone(&transitions));
        transitions
    }

    fn widths(&mut self, rule_set: &RuleSet, state: &ParserState) -> Vec<Transition> {
        let closure = closure(rule_set, state.rule_positions());
        let mut terminals: BTreeMap<RuleId, LookaheadSet> = BTreeMap::new();

        for rp in state.rule_positions() {
            let Some(item) = rp.item(rule_set) else {
                continue;
            };
            if rule_set.rule(item).is_terminal() {
                let lookahead = self.after_direct(rule_set, state, rp);
                terminals.entry(item).or_default().union(&lookahead);
            }
        }
        for entry in &closure.entries {
            let Some(item) = entry.item(rule_set) else {
                continue;
            };
            if rule_set.rule(item).is_terminal() {
                let lookahead = after_entry(rule_set, state, &closure, entry);
                terminals.entry(item).or_default().union(&lookahead);
            }
        }

        terminals
            .into_iter()
            .map(|(terminal, lookahead)| Transition {
                from: state.id(),
                to: self.state_for(vec![RulePosition::end(terminal, 0)]),
                to_rule: terminal,
                to_complete: true,
                action: ParseAction::Width,
                lookahead,
                guard: RuntimeGuard::None,
            })
            .collect()
    }

    fn heights_and_grafts(
        &mut self,
        rule_set: &RuleSet,
        child: &ParserState,
        previous: &ParserState,
    ) -> Vec<Transition> {
        let child_rule = child.rule();
        let mut grafts: BTreeMap<(bool, RuntimeGuard), Vec<RulePosition>> = BTreeMap::new();
        for rp in previous.rule_positions() {
            if rp.item(rule_set) == Some(child_rule) {
                for (next, guard) in rp.advance(rule_set) {
                    grafts.entry((next.is_at_end(), guard)).or_default().push(next);
                }
            }
        }

        let closure = closure(rule_set, previous.rule_positions());
        let mut heights: BTreeMap<(RuleId, bool, RuntimeGuard), Vec<RulePosition>> = BTreeMap::new();
        for entry in &closure.entries {
            if entry.item(rule_set) == Some(child_rule) {
                for (next, guard) in entry.advance(rule_set) {
                    heights
                        .entry((entry.rule(), next.is_at_end(), guard))
                        .or_default()
                        .push(next);
                }
            }
        }

        let previous_is_goal = rule_set.rule(previous.rule()).is_goal();
        let mut transitions = Vec::with_capacity(grafts.len() + heights.len());
        for ((complete, guard), positions) in grafts {
            let mut lookahead = LookaheadSet::empty();
            let nullable = complete || {
                let (first, nullable) = first_of_positions(rule_set, &positions);
                lookahead.add_terminals(first);
                nullable
            };
            if nullable {
                if previous_is_goal {
                    lookahead.set_eot();
                } else {
                    lookahead.set_runtime();
                }
            }
            transitions.push(Transition {
                from: child.id(),
                to: self.state_for(positions),
                to_rule: previous.rule(),
                to_complete: complete,
                action: ParseAction::Graft,
                lookahead,
                guard,
            });
        }
        for ((parent, complete, guard), positions) in heights {
            let mut lookahead = LookaheadSet::empty();
            let nullable = complete || {
                let (first, nullable) = first_of_positions(rule_set, &positions);
                lookahead.add_terminals(first);
                nullable
            };
            if nullable {
                lookahead.union(&follow_in_context(rule_set, previous, &closure, parent));
            }
            transitions.push(Transition {
                from: child.id(),
                to: self.state_for(positions),
                to_rule: parent,
                to_complete: complete,
                action: ParseAction::Height,
                lookahead,
                guard,
            });
        }
        transitions
    }

    /// Lookahead after the item expected by one of the state's own positions.
    fn after_direct(&self, rule_set: &RuleSet, state: &ParserState, rp: &RulePosition) -> LookaheadSet {
        let (first, nullable) = rp.first_after_item(rule_set);
        let mut lookahead = LookaheadSet::from_terminals(first);
        if nullable {
            if state.rule() == self.goal {
                lookahead.set_eot();
            } else {
                lookahead.set_runtime();
            }
        }
        lookahead
    }

    /// Every state and transition reachable from the start state, found by a
    /// fixpoint over (state, previous state) pairs.
    pub(super) fn build(&mut self, rule_set: &RuleSet) {
        let mut reach = Reachability::default();
        reach.add(StateId::new(0), None);

        while let Some((state, previous)) = reach.queue.pop_front() {
            let transitions = self.transitions_for(rule_set, state, previous);
            for transition in transitions.iter() {
                match transition.action {
                    ParseAction::Width => reach.add(transition.to, Some(state)),
                    ParseAction::Height => reach.add(transition.to, previous),
                    ParseAction::Graft => {
                        if let Some(previous) = previous {
                            reach.graft(previous, transition.to);
                        }
                    }
                    ParseAction::Goal => {}
                }
            }
        }
        self.built = true;
        log::debug!(
            "built automaton for {}: {} states, {} transition sets",
            rule_set.rule(self.goal).tag(),
            self.states.len(),
            self.transitions.len()
        );
    }
}

/// Pairs of (state, previous state) that a parse can produce. A graft target
/// inherits the previous states of the node it grafts onto, including those
/// that node gains later.
#[derive(Default)]
struct Reachability {
    pairs: HashSet<TransitionKey, ahash::RandomState>,
    contexts: HashMap<StateId, BTreeSet<Option<StateId>>, ahash::RandomState>,
    graft_targets: HashMap<StateId, BTreeSet<StateId>, ahash::RandomState>,
    queue: VecDeque<TransitionKey>,
}

impl Reachability {
    fn add(&mut self, state: StateId, previous: Option<StateId>) {
        let mut pending = vec![(state, previous)];
        while let Some((state, previous)) = pending.pop() {
            if !self.pairs.insert((state, previous)) {
                continue;
            }
            self.contexts.entry(state).or_default().insert(previous);
            self.queue.push_back((state, previous));
            if let Some(targets) = self.graft_targets.get(&state) {
                pending.extend(targets.iter().map(|target| (*target, previous)));
            }
        }
    }

    fn graft(&mut self, onto: StateId, target: StateId) {
        if !self.graft_targets.entry(onto).or_default().insert(target) {
            return;
        }
        let contexts: Vec<_> = self
            .contexts
            .get(&onto)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default();
        for context in contexts {
            self.add(target, context);
        }
    }
}

fn closure(rule_set: &RuleSet, positions: &[RulePosition]) -> Closure {
    let mut entries = BTreeSet::new();
    let mut visited: HashSet<RuleId, ahash::RandomState> = HashSet::default();
    let mut pending: Vec<RuleId> = positions
        .iter()
        .rev()
        .filter_map(|rp| rp.item(rule_set))
        .collect();

    while let Some(rule) = pending.pop() {
        let Some(rhs) = rule_set.rule(rule).rhs() else {
            continue;
        };
        if !visited.insert(rule) {
            continue;
        }
        for option in 0..rhs.option_count() {
            let entry = RulePosition::start(rule, option as u32);
            if let Some(first) = entry.item(rule_set)
                && rule_set.rule(first).is_non_terminal()
            {
                pending.push(first);
            }
            entries.insert(entry);
        }
    }
    Closure { entries }
}

fn first_of_positions(rule_set: &RuleSet, positions: &[RulePosition]) -> (BTreeSet<RuleId>, bool) {
    let mut first = BTreeSet::new();
    let mut nullable = false;
    for rp in positions {
        let (rp_first, rp_nullable) = rp.first_from_here(rule_set);
        first.extend(rp_first);
        nullable |= rp_nullable;
    }
    (first, nullable)
}

/// Lookahead after the first item of a closure entry.
fn after_entry(
    rule_set: &RuleSet,
    state: &ParserState,
    closure: &Closure,
    entry: &RulePosition,
) -> LookaheadSet {
    let (first, nullable) = entry.first_after_item(rule_set);
    let mut lookahead = LookaheadSet::from_terminals(first);
    if nullable {
        lookahead.union(&follow_in_context(rule_set, state, closure, entry.rule()));
    }
    lookahead
}

/// What can follow a completed `rule` that was entered from `state`: the rest
/// of the state's own positions that expect it, and the rest of every closure
/// entry that starts with it. Walks up through entries whose rest is
/// nullable; the visited set stops at recursion.
fn follow_in_context(
    rule_set: &RuleSet,
    state: &ParserState,
    closure: &Closure,
    rule: RuleId,
) -> LookaheadSet {
    let state_is_goal = rule_set.rule(state.rule()).is_goal();
    let mut lookahead = LookaheadSet::empty();
    let mut visited: HashSet<RuleId, ahash::RandomState> = HashSet::default();
    visited.insert(rule);
    let mut pending = vec![rule];

    while let Some(rule) = pending.pop() {
        for rp in state.rule_positions() {
            if rp.item(rule_set) != Some(rule) {
                continue;
            }
            let (first, nullable) = rp.first_after_item(rule_set);
            lookahead.add_terminals(first);
            if nullable {
                if state_is_goal {
                    lookahead.set_eot();
                } else {
                    lookahead.set_runtime();
                }
            }
        }
        for entry in &closure.entries {
            if entry.item(rule_set) != Some(rule) {
                continue;
            }
            let (first, nullable) = entry.first_after_item(rule_set);
            lookahead.add_terminals(first);
            if nullable && visited.insert(entry.rule()) {
                pending.push(entry.rule());
            }
        }
    }
    lookahead
}
