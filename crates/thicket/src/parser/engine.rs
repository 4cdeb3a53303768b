//! The level-synchronous GSS engine.
//!
//! Work is driven by two queues. Pending levels map an input position to
//! the leaves that end there, together with the head each leaf extends.
//! Within a level, a FIFO of [`Work`] items is drained until nothing is
//! left: `Width` scans the terminals an incomplete head expects, `Reduce`
//! applies the height and graft transitions of a complete node for one of
//! its previous nodes. Nothing recurses, so input length and nesting depth
//! only cost heap.

use super::failure::FailureTracker;
use super::freeze;
use super::stack::{GnId, GnKey, GraphStack, LeafData, Pack};
use super::{ParseContext, Spine};
use crate::automaton::{Automaton, LookaheadSet, ParseAction, StateId, Transition};
use crate::error::IssueHolder;
use crate::rule::{Rhs, RuleId, RuleSet};
use crate::scanner::{OnDemandScanner, Scanner, SkipRun};
use crate::sppt::EmbeddedTree;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

/// When a completed goal counts as a successful parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GoalMode {
    /// Only at the end of the text.
    EndOfText,
    /// Anywhere. Used for embedded terminals, whose host picks among the
    /// ends.
    Longest,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct EngineConfig {
    /// The goal wrapper rule
    pub goal: RuleId,
    pub start: usize,
    pub mode: GoalMode,
    /// Completion queries stop lookahead checks at this position.
    pub limit: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct EngineOutcome {
    pub stack: GraphStack,
    pub initial_skip: SkipRun,
    /// The accepted goal that ends furthest.
    pub accepted: Option<GnId>,
    /// Every accepted goal, in the order reached.
    pub goals: Vec<GnId>,
    pub failure: FailureTracker,
    pub interrupted: Option<String>,
    pub levels: usize,
    pub leaves: usize,
}

#[derive(Debug, Clone, Copy)]
enum Work {
    Width(GnId),
    Reduce(GnId, Option<GnId>),
}

struct Engine<'a> {
    rule_set: &'a RuleSet,
    automaton: &'a Automaton,
    scanner: &'a mut dyn Scanner,
    config: EngineConfig,
    text_len: usize,
    stack: GraphStack,
    pending: BTreeMap<usize, Vec<(GnId, GnId)>>,
    queue: VecDeque<Work>,
    level: usize,
    accepted: Vec<GnId>,
    failure: FailureTracker,
    leaves: usize,
}

/// Runs one parse to completion, interruption or failure.
pub(crate) fn run(
    rule_set: &RuleSet,
    automaton: &Automaton,
    scanner: &mut dyn Scanner,
    config: &EngineConfig,
    context: &ParseContext,
) -> EngineOutcome {
    let text_len = scanner.text().len();
    let initial_skip = scanner.skip_at(config.start);
    let mut engine = Engine {
        rule_set,
        automaton,
        scanner,
        config: *config,
        text_len,
        stack: GraphStack::default(),
        pending: BTreeMap::new(),
        queue: VecDeque::new(),
        level: initial_skip.end,
        accepted: Vec::new(),
        failure: FailureTracker::default(),
        leaves: 0,
    };

    let start = initial_skip.end;
    let (goal, _) = engine.stack.get_or_create(
        GnKey {
            state: automaton.start_state(),
            start,
            next_input: start,
            count: 0,
        },
        config.goal,
        false,
    );
    engine.queue.push_back(Work::Width(goal));

    let _running = (!context.nested).then(|| context.interrupt.begin());
    let mut levels = 0;
    let mut interrupted = None;
    loop {
        // nested parses leave the request for the parse that owns it
        let requested = if context.nested {
            context.interrupt.is_requested().then(String::new)
        } else {
            context.interrupt.consume()
        };
        if requested.is_some() {
            interrupted = requested;
            break;
        }
        levels += 1;
        log::trace!("level {}: {} queued", engine.level, engine.queue.len());
        engine.process_level();

        let Some((level, arrivals)) = engine.pending.pop_first() else {
            break;
        };
        engine.level = level;
        for (leaf, previous) in arrivals {
            engine.add_previous(leaf, previous);
        }
    }

    let accepted = engine
        .accepted
        .iter()
        .copied()
        .max_by_key(|id| (engine.stack.node(*id).next_input, std::cmp::Reverse(*id)));
    EngineOutcome {
        stack: engine.stack,
        initial_skip,
        accepted,
        goals: engine.accepted,
        failure: engine.failure,
        interrupted,
        levels,
        leaves: engine.leaves,
    }
}

impl Engine<'_> {
    fn process_level(&mut self) {
        while let Some(work) = self.queue.pop_front() {
            match work {
                Work::Width(node) => self.width(node),
                Work::Reduce(node, previous) => self.reduce(node, previous),
            }
        }
    }

    fn transitions(&self, state: StateId, previous: Option<StateId>) -> Arc<[Transition]> {
        self.automaton.transitions(self.rule_set, state, previous)
    }

    fn lookahead_ok(&mut self, lookahead: &LookaheadSet, at: usize) -> bool {
        if let Some(limit) = self.config.limit
            && at >= limit
        {
            return true;
        }
        if lookahead.includes_runtime() || lookahead.is_empty() {
            return true;
        }
        // an embedded parse may end anywhere
        if lookahead.includes_eot() && (at == self.text_len || self.config.mode == GoalMode::Longest) {
            return true;
        }
        lookahead
            .terminals()
            .iter()
            .any(|terminal| self.scanner.lookahead_matches(at, *terminal))
    }

    /// Links `node` to `previous`, and passes the new link on to the nodes
    /// already grafted onto `node` on this level.
    fn add_previous(&mut self, node: GnId, previous: GnId) {
        let mut links = vec![(node, previous)];
        while let Some((node, previous)) = links.pop() {
            if !self.stack.link(node, previous) {
                continue;
            }
            let grown = self.stack.node(node);
            if grown.complete {
                self.queue.push_back(Work::Reduce(node, Some(previous)));
            }
            links.extend(grown.next.iter().map(|next| (*next, previous)));
        }
    }

    fn width(&mut self, head: GnId) {
        let position = self.level;
        let transitions = self.transitions(self.stack.node(head).state, None);
        for transition in transitions.iter() {
            if transition.action != ParseAction::Width {
                continue;
            }
            let terminal = transition.to_rule;
            let found = self.scanner.terminal_at(position, terminal);
            if found.is_empty() && !self.rule_set.rule(terminal).is_empty_terminal() {
                self.failure.expected_terminal(position, terminal);
            }
            for found in found {
                let skip = self.scanner.skip_at(found.end);
                let next_input = skip.end;
                if !self.lookahead_ok(&transition.lookahead, next_input) {
                    self.failure.lookahead(next_input, &transition.lookahead);
                    continue;
                }

                let (leaf, created) = self.stack.get_or_create(
                    GnKey {
                        state: transition.to,
                        start: position,
                        next_input,
                        count: 0,
                    },
                    terminal,
                    true,
                );
                if created {
                    self.leaves += 1;
                    self.stack.node_mut(leaf).leaf = Some(LeafData {
                        match_end: found.end,
                        skip: skip.leaves,
                        embedded: found.embedded,
                    });
                }
                if next_input == position {
                    self.add_previous(leaf, head);
                } else {
                    self.pending.entry(next_input).or_default().push((leaf, head));
                }
            }
        }
    }

    fn reduce(&mut self, node: GnId, previous: Option<GnId>) {
        let state = self.stack.node(node).state;
        let previous_state = previous.map(|p| self.stack.node(p).state);
        let transitions = self.transitions(state, previous_state);
        for transition in transitions.iter() {
            match (transition.action, previous) {
                (ParseAction::Goal, None) => self.goal_reached(node),
                (ParseAction::Height, Some(previous)) => self.height(node, previous, transition),
                (ParseAction::Graft, Some(previous)) => self.graft(node, previous, transition),
                _ => {}
            }
        }
    }

    fn goal_reached(&mut self, goal: GnId) {
        let at = self.stack.node(goal).next_input;
        match self.config.mode {
            GoalMode::EndOfText if at != self.text_len => self.failure.expected_end(at),
            _ => {
                if !self.accepted.contains(&goal) {
                    log::trace!("goal reached at {at}");
                    self.accepted.push(goal);
                }
            }
        }
    }

    fn height(&mut self, child: GnId, previous: GnId, transition: &Transition) {
        if !transition.guard.allows(1) {
            return;
        }
        let (start, next_input) = {
            let child = self.stack.node(child);
            (child.start, child.next_input)
        };
        if !self.lookahead_ok(&transition.lookahead, next_input) {
            self.failure.lookahead(next_input, &transition.lookahead);
            return;
        }
        let (target, created) = self.stack.get_or_create(
            GnKey {
                state: transition.to,
                start,
                next_input,
                count: self.key_count(transition.to_rule, 1),
            },
            transition.to_rule,
            transition.to_complete,
        );
        self.stack.add_pack(target, Pack { left: None, child });
        if created && !transition.to_complete {
            self.queue.push_back(Work::Width(target));
        }
        self.add_previous(target, previous);
    }

    fn graft(&mut self, child: GnId, previous: GnId, transition: &Transition) {
        let (left_start, left_next_input, count, inherited) = {
            let left = self.stack.node(previous);
            (left.start, left.next_input, left.count + 1, left.previous.clone())
        };
        if !transition.guard.allows(count as usize) {
            return;
        }
        let (child_start, next_input) = {
            let child = self.stack.node(child);
            (child.start, child.next_input)
        };
        if child_start == next_input && self.redundant_empty_item(transition.to_rule, count) {
            return;
        }
        if !self.lookahead_ok(&transition.lookahead, next_input) {
            self.failure.lookahead(next_input, &transition.lookahead);
            return;
        }

        let (target, created) = self.stack.get_or_create(
            GnKey {
                state: transition.to,
                start: left_start,
                next_input,
                count: self.key_count(transition.to_rule, count),
            },
            transition.to_rule,
            transition.to_complete,
        );
        if target == previous {
            return;
        }
        self.stack.add_pack(
            target,
            Pack {
                left: Some(previous),
                child,
            },
        );
        if created && !transition.to_complete {
            self.queue.push_back(Work::Width(target));
        }
        if inherited.is_empty() && created && transition.to_complete {
            self.queue.push_back(Work::Reduce(target, None));
        }
        for grand in inherited {
            self.add_previous(target, grand);
        }
        if left_next_input == self.level {
            self.stack.add_next(previous, target);
        }
    }

    /// List bounds of `rule`: (min, max, separated).
    fn list_bounds(&self, rule: RuleId) -> Option<(usize, Option<usize>, bool)> {
        match self.rule_set.rule(rule).rhs()? {
            Rhs::List { min, max, .. } => Some((*min, *max, false)),
            Rhs::SeparatedList { min, max, .. } => Some((*min, *max, true)),
            _ => None,
        }
    }

    /// The child count that goes into a node key. Beyond what a guard can
    /// observe, counts are merged so unbounded lists share nodes.
    fn key_count(&self, rule: RuleId, count: u32) -> u32 {
        match self.list_bounds(rule) {
            Some((_, Some(_), _)) => count,
            Some((min, None, separated)) => {
                let cap = if separated { 2 * min } else { min };
                count.min(u32::try_from(cap).unwrap_or(u32::MAX))
            }
            None => 0,
        }
    }

    /// A zero-length item adds nothing to a list once its minimum is met.
    fn redundant_empty_item(&self, rule: RuleId, count: u32) -> bool {
        let Some((min, _, separated)) = self.list_bounds(rule) else {
            return false;
        };
        let count = count as usize;
        let items = if separated { count.div_ceil(2) } else { count };
        items > min.max(1)
    }
}

/// Parses an embedded rule set's goal starting at `position` of `text`.
///
/// Returns every end the goal can be matched to, longest first, each with
/// its tree. The host parse keeps the ends its lookahead allows.
pub(crate) fn parse_embedded(
    rule_set: &Arc<RuleSet>,
    goal: RuleId,
    text: &str,
    position: usize,
    context: &ParseContext,
) -> Vec<(usize, Arc<EmbeddedTree>)> {
    let Some(goal) = rule_set.goal_rule_for(goal) else {
        return Vec::new();
    };
    let automaton = rule_set.automaton(goal, context.automaton_kind);
    let nested = ParseContext {
        nested: true,
        ..context.clone()
    };
    let mut scanner = OnDemandScanner::new(Arc::clone(rule_set), text, nested.clone());
    let outcome = run(
        rule_set,
        &automaton,
        &mut scanner,
        &EngineConfig {
            goal,
            start: position,
            mode: GoalMode::Longest,
            limit: None,
        },
        &nested,
    );
    if outcome.interrupted.is_some() {
        return Vec::new();
    }

    let mut goals = outcome.goals.clone();
    goals.sort_by_key(|id| (std::cmp::Reverse(outcome.stack.node(*id).next_input), *id));
    goals.dedup_by_key(|id| outcome.stack.node(*id).next_input);
    let mut issues = IssueHolder::new();
    goals
        .into_iter()
        .filter_map(|accepted| {
            let end = outcome.stack.node(accepted).next_input;
            let tree = freeze::freeze_goal(rule_set, text, &outcome, accepted, false, &mut issues)?;
            log::trace!("embedded '{}' matched {}..{}", rule_set.name(), position, end);
            Some((end, Arc::new(EmbeddedTree::new(Arc::clone(rule_set), tree))))
        })
        .collect()
}

/// Live heads at `position` after a completion parse.
pub(crate) fn spines(
    rule_set: &RuleSet,
    automaton: &Automaton,
    outcome: &EngineOutcome,
    position: usize,
) -> BTreeSet<Spine> {
    let stack = &outcome.stack;
    let mut spines = BTreeSet::new();
    for (id, node) in stack.iter() {
        if node.complete || node.next_input != position {
            continue;
        }
        let expected_next: BTreeSet<RuleId> = automaton
            .transitions(rule_set, node.state, None)
            .iter()
            .filter(|t| t.action == ParseAction::Width)
            .map(|t| t.to_rule)
            .filter(|terminal| !rule_set.rule(*terminal).is_empty_terminal())
            .collect();
        if expected_next.is_empty() {
            continue;
        }
        let mut elements = Vec::new();
        let mut current = Some(id);
        let mut seen = BTreeSet::new();
        while let Some(at) = current {
            if !seen.insert(at) {
                break;
            }
            let node = stack.node(at);
            if !rule_set.rule(node.rule).is_goal() {
                elements.push(node.rule);
            }
            current = node.previous.first().copied();
        }
        let next_child_number = if rule_set.rule(node.rule).rhs().is_some_and(Rhs::is_list) {
            node.count as usize
        } else {
            automaton
                .state(node.state)
                .rule_positions()
                .first()
                .map_or(0, |rp| rp.position() as usize)
        };
        spines.insert(Spine {
            expected_next,
            elements,
            next_child_number,
        });
    }
    spines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleExpr, RuleSetBuilder};

    fn outcome(rule_set: &Arc<RuleSet>, goal: &str, text: &str, mode: GoalMode) -> EngineOutcome {
        let goal = rule_set
            .find_rule(goal)
            .and_then(|rule| rule_set.goal_rule_for(rule))
            .unwrap();
        let automaton = rule_set.automaton(goal, Default::default());
        let mut scanner = OnDemandScanner::new(Arc::clone(rule_set), text, ParseContext::default());
        run(
            rule_set,
            &automaton,
            &mut scanner,
            &EngineConfig {
                goal,
                start: 0,
                mode,
                limit: None,
            },
            &ParseContext::default(),
        )
    }

    #[test]
    fn longest_mode_accepts_longest_prefix() {
        let rules = RuleSetBuilder::new("Prefix")
            .rule("S", RuleExpr::many1(RuleExpr::literal("a")))
            .build()
            .unwrap();
        let longest = outcome(&rules, "S", "aab", GoalMode::Longest);
        let accepted = longest.accepted.unwrap();
        assert_eq!(longest.stack.node(accepted).next_input, 2);

        let whole = outcome(&rules, "S", "aab", GoalMode::EndOfText);
        assert!(whole.accepted.is_none());
        assert_eq!(whole.failure.position(), Some(2));
    }

    #[test]
    fn height_and_graft_results_share_nodes() {
        let rules = RuleSetBuilder::new("LeftRec")
            .rule("S", RuleExpr::rule("E"))
            .rule(
                "E",
                RuleExpr::longest([
                    RuleExpr::seq([RuleExpr::rule("E"), RuleExpr::literal("+"), RuleExpr::literal("n")]),
                    RuleExpr::literal("n"),
                ]),
            )
            .build()
            .unwrap();
        let result = outcome(&rules, "S", "n+n+n", GoalMode::EndOfText);
        assert!(result.accepted.is_some());

        let keys: BTreeSet<_> = result
            .stack
            .iter()
            .map(|(_, node)| (node.state, node.start, node.next_input, node.count))
            .collect();
        assert_eq!(keys.len(), result.stack.len());

        let mut issues = IssueHolder::new();
        let tree = freeze::freeze(&rules, "n+n+n", &result, true, &mut issues).unwrap();
        assert_eq!(tree.count_trees(), 1);
        assert!(issues.is_empty());
    }

    #[test]
    fn zero_length_items_do_not_loop() {
        let rules = RuleSetBuilder::new("Empty")
            .rule("S", RuleExpr::many(RuleExpr::rule("O")))
            .rule("O", RuleExpr::optional(RuleExpr::literal("x")))
            .build()
            .unwrap();
        let result = outcome(&rules, "S", "xx", GoalMode::EndOfText);
        assert!(result.accepted.is_some());
        let mut issues = IssueHolder::new();
        let tree = freeze::freeze(&rules, "xx", &result, false, &mut issues).unwrap();
        assert!(tree.count_trees() >= 1);
    }
}
