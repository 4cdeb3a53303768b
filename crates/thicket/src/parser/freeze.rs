//! Turning the growing nodes of a successful parse into an [`Sppt`].
//!
//! Only nodes reachable from the accepted goal are kept. Each complete
//! growing node contributes the child lists spelled out by its packs; nodes
//! of the same rule over the same span are merged into one forest node.
//! Disambiguation, cycle removal and pruning then run on the forest.
//!
//! [`Sppt`]: crate::sppt::Sppt

use super::engine::EngineOutcome;
use super::stack::{GnId, GraphStack, GrowingNode};
use crate::error::{IssueData, IssueHolder, LineIndex, ParsePhase};
use crate::rule::{ChoiceKind, Rhs, RuleId, RuleSet};
use crate::sppt::{Alternative, SpptNode, TreeData};
use hashbrown::{HashMap, HashSet};
use smallvec::{SmallVec, smallvec};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

const fn forest_node(node: &GrowingNode) -> SpptNode {
    SpptNode::new(node.rule, node.start, node.next_input)
}

/// Freezes the forest under the accepted goal that ends furthest.
pub(crate) fn freeze(
    rule_set: &RuleSet,
    text: &str,
    outcome: &EngineOutcome,
    report_ambiguities: bool,
    issues: &mut IssueHolder,
) -> Option<TreeData> {
    freeze_goal(rule_set, text, outcome, outcome.accepted?, report_ambiguities, issues)
}

/// Freezes the forest under one accepted goal node.
pub(crate) fn freeze_goal(
    rule_set: &RuleSet,
    text: &str,
    outcome: &EngineOutcome,
    accepted: GnId,
    report_ambiguities: bool,
    issues: &mut IssueHolder,
) -> Option<TreeData> {
    let stack = &outcome.stack;
    let goal = stack.node(accepted);
    let root = goal
        .packs
        .iter()
        .map(|pack| forest_node(stack.node(pack.child)))
        .min()?;

    let mut by_node: HashMap<SpptNode, SmallVec<[GnId; 2]>, ahash::RandomState> = HashMap::default();
    for (id, node) in stack.iter() {
        if node.complete && !rule_set.rule(node.rule).is_goal() {
            by_node.entry(forest_node(node)).or_default().push(id);
        }
    }

    let mut tree = TreeData {
        root: Some(root),
        ..TreeData::default()
    };
    for leaf in &outcome.initial_skip.leaves {
        let skip = SpptNode::new(leaf.rule, leaf.start, leaf.end);
        tree.leaves.insert(skip, leaf.end);
        tree.initial_skip.push(skip);
    }

    let mut queue = VecDeque::from([root]);
    let mut seen: HashSet<SpptNode, ahash::RandomState> = HashSet::default();
    seen.insert(root);
    while let Some(node) = queue.pop_front() {
        let Some(ids) = by_node.get(&node) else {
            continue;
        };
        if let Some(leaf) = ids.iter().find_map(|id| stack.node(*id).leaf.as_ref()) {
            tree.leaves.insert(node, leaf.match_end);
            let skip: Vec<SpptNode> = leaf
                .skip
                .iter()
                .map(|s| SpptNode::new(s.rule, s.start, s.end))
                .collect();
            for s in &skip {
                tree.leaves.insert(*s, s.next_input);
            }
            if !skip.is_empty() {
                tree.skip.insert(node, skip);
            }
            if let Some(embedded) = &leaf.embedded {
                tree.embedded.insert(node, Arc::clone(embedded));
            }
            continue;
        }

        let mut alternatives = BTreeSet::new();
        for id in ids {
            for children in child_lists(stack, *id) {
                let children: Vec<SpptNode> = children.iter().map(|c| forest_node(stack.node(*c))).collect();
                for option in options_for(rule_set, node.rule, &children) {
                    alternatives.insert(Alternative {
                        option,
                        children: children.clone(),
                    });
                }
            }
        }
        for alternative in &alternatives {
            for child in &alternative.children {
                if seen.insert(*child) {
                    queue.push_back(*child);
                }
            }
        }
        tree.branches.insert(node, alternatives.into_iter().collect());
    }

    disambiguate(rule_set, &mut tree);
    remove_cycles(&mut tree, root);
    if !prune(&mut tree, root) {
        log::debug!("no acyclic derivation for {}", rule_set.rule(root.rule).tag());
        return None;
    }
    if report_ambiguities {
        report(rule_set, text, &tree, issues);
    }
    Some(tree)
}

/// Every child list a complete growing node stands for, read from its packs
/// right to left.
fn child_lists(stack: &GraphStack, id: GnId) -> Vec<Vec<GnId>> {
    let mut lists = Vec::new();
    // (node, children to its right, nodes passed at the current position)
    let mut work: Vec<(GnId, Vec<GnId>, SmallVec<[GnId; 2]>)> = vec![(id, Vec::new(), SmallVec::new())];
    while let Some((at, suffix, same_position)) = work.pop() {
        for pack in &stack.node(at).packs {
            let mut children = Vec::with_capacity(suffix.len() + 1);
            children.push(pack.child);
            children.extend_from_slice(&suffix);
            let Some(left) = pack.left else {
                lists.push(children);
                continue;
            };
            let child = stack.node(pack.child);
            let mut passed = if child.start == child.next_input {
                same_position.clone()
            } else {
                SmallVec::new()
            };
            // zero-length children can loop back to a node already passed
            if passed.contains(&left) {
                continue;
            }
            passed.push(at);
            work.push((left, children, passed));
        }
    }
    lists
}

/// Options of `rule` whose items match `children`.
fn options_for(rule_set: &RuleSet, rule: RuleId, children: &[SpptNode]) -> SmallVec<[u32; 2]> {
    let rules: SmallVec<[RuleId; 4]> = children.iter().map(|c| c.rule).collect();
    match rule_set.rule(rule).rhs() {
        Some(Rhs::Choice { options, .. }) => {
            let matching: SmallVec<[u32; 2]> = options
                .iter()
                .enumerate()
                .filter(|(_, items)| items.as_slice() == rules.as_slice())
                .map(|(index, _)| index as u32)
                .collect();
            if matching.is_empty() { smallvec![0] } else { matching }
        }
        Some(
            Rhs::Optional { empty, .. }
            | Rhs::List { empty: Some(empty), .. }
            | Rhs::SeparatedList { empty: Some(empty), .. },
        ) if rules.as_slice() == [*empty] => smallvec![1],
        _ => smallvec![0],
    }
}

fn is_longest_choice(rule_set: &RuleSet, rule: RuleId) -> bool {
    rule_set.rule(rule).rhs().and_then(Rhs::choice_kind) == Some(ChoiceKind::LongestMatch)
}

fn first_difference(a: &[SpptNode], b: &[SpptNode]) -> Option<(SpptNode, SpptNode)> {
    a.iter().zip(b).find(|(x, y)| x != y).map(|(x, y)| (*x, *y))
}

/// `a` loses to `b` when the first child they differ in is a shorter match
/// of the same longest-match choice at the same start. Shorter matches of
/// any other rule are followed through their first alternatives down to
/// the first pair of children that differ.
fn loses_longest(rule_set: &RuleSet, tree: &TreeData, a: &Alternative, b: &Alternative) -> bool {
    let mut pair = first_difference(&a.children, &b.children);
    let mut visited: HashSet<(SpptNode, SpptNode), ahash::RandomState> = HashSet::default();
    while let Some((x, y)) = pair {
        if x.rule != y.rule || x.start != y.start || x.next_input >= y.next_input {
            return false;
        }
        if is_longest_choice(rule_set, x.rule) {
            return true;
        }
        if !visited.insert((x, y)) {
            return false;
        }
        let (Some(x_first), Some(y_first)) = (tree.alternatives(&x).first(), tree.alternatives(&y).first()) else {
            return false;
        };
        pair = first_difference(&x_first.children, &y_first.children);
    }
    false
}

/// Applies priority and longest-match choices. Every decision reads the
/// forest as it was before any alternative was dropped.
fn disambiguate(rule_set: &RuleSet, tree: &mut TreeData) {
    let mut decided = Vec::new();
    for (node, alternatives) in &tree.branches {
        if alternatives.len() < 2 {
            continue;
        }
        let mut kept: Vec<&Alternative> = alternatives.iter().collect();
        let kind = rule_set.rule(node.rule).rhs().and_then(Rhs::choice_kind);
        if kind == Some(ChoiceKind::Priority) {
            let best = kept.iter().map(|a| a.option).min();
            kept.retain(|a| Some(a.option) == best);
        }
        if kept.len() > 1 {
            let losing: Vec<bool> = kept
                .iter()
                .map(|a| kept.iter().any(|b| loses_longest(rule_set, tree, a, b)))
                .collect();
            let mut index = 0;
            kept.retain(|_| {
                index += 1;
                !losing[index - 1]
            });
        }
        if kept.len() < alternatives.len() {
            decided.push((*node, kept.into_iter().cloned().collect::<Vec<_>>()));
        }
    }
    for (node, kept) in decided {
        tree.branches.insert(node, kept);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

/// Drops every alternative that leads back to a node on the current path.
fn remove_cycles(tree: &mut TreeData, root: SpptNode) {
    let mut color: HashMap<SpptNode, Color, ahash::RandomState> = HashMap::default();
    let mut cyclic: HashSet<(SpptNode, usize), ahash::RandomState> = HashSet::default();
    // (node, alternative, child)
    let mut stack = vec![(root, 0usize, 0usize)];
    color.insert(root, Color::Gray);

    while let Some(top) = stack.last_mut() {
        let (node, alternative, child) = *top;
        let alternatives = tree.alternatives(&node);
        let Some(current) = alternatives.get(alternative) else {
            color.insert(node, Color::Black);
            stack.pop();
            continue;
        };
        let Some(next) = current.children.get(child).copied() else {
            top.1 += 1;
            top.2 = 0;
            continue;
        };
        top.2 += 1;
        match color.get(&next) {
            Some(Color::Gray) => {
                cyclic.insert((node, alternative));
            }
            Some(Color::Black) => {}
            None => {
                if tree.is_branch(&next) {
                    color.insert(next, Color::Gray);
                    stack.push((next, 0, 0));
                } else {
                    color.insert(next, Color::Black);
                }
            }
        }
    }

    for (node, alternatives) in &mut tree.branches {
        let mut index = 0;
        alternatives.retain(|_| {
            index += 1;
            !cyclic.contains(&(*node, index - 1))
        });
    }
}

/// Removes branches left without alternatives, the alternatives that use
/// them, and everything unreachable from the root. Returns `false` if the
/// root itself is gone.
fn prune(tree: &mut TreeData, root: SpptNode) -> bool {
    loop {
        let dead: HashSet<SpptNode, ahash::RandomState> = tree
            .branches
            .iter()
            .filter(|(_, alternatives)| alternatives.is_empty())
            .map(|(node, _)| *node)
            .collect();
        if dead.is_empty() {
            break;
        }
        tree.branches.retain(|node, _| !dead.contains(node));
        for alternatives in tree.branches.values_mut() {
            alternatives.retain(|a| a.children.iter().all(|child| !dead.contains(child)));
        }
    }
    if !tree.is_branch(&root) && !tree.is_leaf(&root) {
        return false;
    }

    let mut reachable: HashSet<SpptNode, ahash::RandomState> = tree.initial_skip.iter().copied().collect();
    let mut pending = vec![root];
    reachable.insert(root);
    while let Some(node) = pending.pop() {
        for skip in tree.skip_after(&node) {
            reachable.insert(*skip);
        }
        for alternative in tree.alternatives(&node) {
            for child in &alternative.children {
                if reachable.insert(*child) {
                    pending.push(*child);
                }
            }
        }
    }
    tree.branches.retain(|node, _| reachable.contains(node));
    tree.leaves.retain(|node, _| reachable.contains(node));
    tree.skip.retain(|node, _| reachable.contains(node));
    tree.embedded.retain(|node, _| reachable.contains(node));
    true
}

fn report(rule_set: &RuleSet, text: &str, tree: &TreeData, issues: &mut IssueHolder) {
    let index = LineIndex::new(text);
    let mut ambiguous: Vec<(&SpptNode, &Vec<Alternative>)> = tree
        .branches
        .iter()
        .filter(|(_, alternatives)| alternatives.len() > 1)
        .collect();
    ambiguous.sort_by_key(|(node, _)| **node);
    for (node, alternatives) in ambiguous {
        let tag = rule_set.rule(node.rule).tag();
        let options: Vec<u32> = alternatives.iter().map(|a| a.option).collect();
        issues.warning(
            ParsePhase::Parse,
            Some(index.location(node.start, node.next_input - node.start)),
            format!("Ambiguity in {tag}: {} alternatives", alternatives.len()),
            Some(IssueData::Ambiguity {
                rule: tag.into(),
                options,
            }),
        );
    }
}
