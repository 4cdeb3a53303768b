//! # Shared Packed Parse Tree
//!
//! The frozen result of a successful parse. Every node is identified by its
//! rule and the span it covers, so a sub-tree shared by several derivations
//! is stored once. A branch node with more than one [`Alternative`] is
//! ambiguous.
//!
//! Skip leaves (whitespace, comments) are not children. They are attached to
//! the leaf they follow, or to the tree itself when they precede the root.
//! Embedded rule sets produce their own [`TreeData`], hosted by the leaf of
//! the embedding terminal.
//!
//! An [`Sppt`] owns its data and is cheap to clone.

mod print;
mod tokens;
mod walker;

pub use tokens::LeafToken;
pub use walker::{NodeRef, SpptWalker};

use crate::rule::{Rule, RuleId, RuleSet};
use hashbrown::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A node of the forest: a rule matched over `start..next_input`.
///
/// `next_input` includes the skip text that follows the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SpptNode {
    pub rule: RuleId,
    pub start: usize,
    pub next_input: usize,
}

impl SpptNode {
    #[must_use]
    pub const fn new(rule: RuleId, start: usize, next_input: usize) -> Self {
        Self {
            rule,
            start,
            next_input,
        }
    }
}

/// One way of deriving a branch node: the option of its rule that matched,
/// and the children in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Alternative {
    pub option: u32,
    pub children: Vec<SpptNode>,
}

/// The tree of an embedded rule set, with the rule set its nodes refer to.
#[derive(Debug, Clone)]
pub struct EmbeddedTree {
    rule_set: Arc<RuleSet>,
    tree: TreeData,
}

impl EmbeddedTree {
    pub(crate) const fn new(rule_set: Arc<RuleSet>, tree: TreeData) -> Self {
        Self { rule_set, tree }
    }

    #[must_use]
    pub fn rule_set(&self) -> &Arc<RuleSet> {
        &self.rule_set
    }

    #[must_use]
    pub const fn tree(&self) -> &TreeData {
        &self.tree
    }
}

/// Nodes, alternatives, skip data and embedded trees of one forest.
#[derive(Debug, Clone, Default)]
pub struct TreeData {
    pub(crate) root: Option<SpptNode>,
    pub(crate) initial_skip: Vec<SpptNode>,
    pub(crate) branches: HashMap<SpptNode, Vec<Alternative>, ahash::RandomState>,
    pub(crate) leaves: HashMap<SpptNode, usize, ahash::RandomState>,
    pub(crate) skip: HashMap<SpptNode, Vec<SpptNode>, ahash::RandomState>,
    pub(crate) embedded: HashMap<SpptNode, Arc<EmbeddedTree>, ahash::RandomState>,
}

impl TreeData {
    #[must_use]
    pub const fn root(&self) -> Option<SpptNode> {
        self.root
    }

    /// Skip leaves before the root.
    #[must_use]
    pub fn initial_skip(&self) -> &[SpptNode] {
        &self.initial_skip
    }

    /// Alternatives of a branch node; empty for leaves and unknown nodes.
    #[must_use]
    pub fn alternatives(&self, node: &SpptNode) -> &[Alternative] {
        self.branches.get(node).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_leaf(&self, node: &SpptNode) -> bool {
        self.leaves.contains_key(node)
    }

    #[must_use]
    pub fn is_branch(&self, node: &SpptNode) -> bool {
        self.branches.contains_key(node)
    }

    /// End of the leaf's own text, before any skip that follows it.
    #[must_use]
    pub fn leaf_end(&self, node: &SpptNode) -> Option<usize> {
        self.leaves.get(node).copied()
    }

    /// Skip leaves directly after a leaf.
    #[must_use]
    pub fn skip_after(&self, node: &SpptNode) -> &[SpptNode] {
        self.skip.get(node).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn embedded(&self, node: &SpptNode) -> Option<&EmbeddedTree> {
        self.embedded.get(node).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Whether any branch node, here or in an embedded tree, has more than
    /// one alternative.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.branches.values().any(|alternatives| alternatives.len() > 1)
            || self.embedded.values().any(|e| e.tree.is_ambiguous())
    }

    /// Number of distinct trees in the forest, saturating at `u64::MAX`.
    #[must_use]
    pub fn count_trees(&self) -> u64 {
        let Some(root) = self.root else {
            return 0;
        };
        let mut counts: HashMap<SpptNode, u64, ahash::RandomState> = HashMap::default();
        let mut stack = vec![(root, false)];
        while let Some((node, expanded)) = stack.pop() {
            if counts.contains_key(&node) {
                continue;
            }
            let alternatives = self.alternatives(&node);
            if alternatives.is_empty() {
                let count = self.embedded(&node).map_or(1, |e| e.tree.count_trees());
                counts.insert(node, count);
                continue;
            }
            if !expanded {
                stack.push((node, true));
                for alternative in alternatives {
                    for child in &alternative.children {
                        if !counts.contains_key(child) {
                            stack.push((*child, false));
                        }
                    }
                }
                continue;
            }
            let count = alternatives.iter().fold(0u64, |total, alternative| {
                let product = alternative.children.iter().fold(1u64, |product, child| {
                    // a child still missing here closes a cycle; count it once
                    product.saturating_mul(counts.get(child).copied().unwrap_or(1))
                });
                total.saturating_add(product)
            });
            counts.insert(node, count);
        }
        counts.get(&root).copied().unwrap_or(0)
    }
}

/// A shared packed parse tree over a text.
#[derive(Debug, Clone)]
pub struct Sppt {
    rule_set: Arc<RuleSet>,
    text: Arc<str>,
    tree: Arc<TreeData>,
}

impl Sppt {
    pub(crate) fn new(rule_set: Arc<RuleSet>, text: Arc<str>, tree: TreeData) -> Self {
        Self {
            rule_set,
            text,
            tree: Arc::new(tree),
        }
    }

    #[must_use]
    pub fn rule_set(&self) -> &Arc<RuleSet> {
        &self.rule_set
    }

    /// The whole parsed text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn tree(&self) -> &TreeData {
        &self.tree
    }

    /// The root node. A tree produced by a successful parse always has one.
    #[must_use]
    pub fn root(&self) -> SpptNode {
        self.tree
            .root
            .unwrap_or(SpptNode::new(self.rule_set.end_of_text(), 0, 0))
    }

    /// A view of the root node.
    #[must_use]
    pub fn root_ref(&self) -> NodeRef<'_> {
        NodeRef::new(&self.rule_set, &self.tree, &self.text, self.root())
    }

    #[must_use]
    pub fn rule(&self, node: &SpptNode) -> &Rule {
        self.rule_set.rule(node.rule)
    }

    /// Text covered by `node`, including trailing skip.
    #[must_use]
    pub fn matched_text(&self, node: &SpptNode) -> &str {
        &self.text[node.start..node.next_input]
    }

    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.tree.is_ambiguous()
    }

    #[must_use]
    pub fn count_trees(&self) -> u64 {
        self.tree.count_trees()
    }

    /// Rebuilds the input from the leaves of the first tree, skip included.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.leaves().iter().map(|leaf| leaf.text.as_str()).collect()
    }
}

impl PartialEq for Sppt {
    /// Structural equality: same text, and nodes that match by tag, span,
    /// options, children and skip data.
    fn eq(&self, other: &Self) -> bool {
        if self.text != other.text {
            return false;
        }
        let left = Side {
            rule_set: &self.rule_set,
            tree: &self.tree,
        };
        let right = Side {
            rule_set: &other.rule_set,
            tree: &other.tree,
        };
        trees_equal(left, right)
    }
}

impl Eq for Sppt {}

#[derive(Clone, Copy)]
struct Side<'a> {
    rule_set: &'a RuleSet,
    tree: &'a TreeData,
}

impl Side<'_> {
    fn tag(&self, node: &SpptNode) -> &str {
        self.rule_set.rule(node.rule).tag()
    }

    fn same_nodes(&self, nodes: &[SpptNode], other: &Side<'_>, other_nodes: &[SpptNode]) -> bool {
        nodes.len() == other_nodes.len()
            && nodes.iter().zip(other_nodes).all(|(a, b)| {
                a.start == b.start && a.next_input == b.next_input && self.tag(a) == other.tag(b)
            })
    }

    fn id(&self) -> usize {
        std::ptr::from_ref(self.tree) as usize
    }
}

type PairStack<'a> = Vec<(Side<'a>, SpptNode, Side<'a>, SpptNode)>;

fn push_tree<'a>(stack: &mut PairStack<'a>, left: Side<'a>, right: Side<'a>) -> bool {
    if !left.same_nodes(left.tree.initial_skip(), &right, right.tree.initial_skip()) {
        return false;
    }
    match (left.tree.root, right.tree.root) {
        (Some(a), Some(b)) => {
            stack.push((left, a, right, b));
            true
        }
        (None, None) => true,
        _ => false,
    }
}

fn trees_equal<'a>(left: Side<'a>, right: Side<'a>) -> bool {
    let mut stack: PairStack<'a> = Vec::new();
    let mut seen: HashSet<(usize, SpptNode, usize, SpptNode), ahash::RandomState> = HashSet::default();

    if !push_tree(&mut stack, left, right) {
        return false;
    }

    while let Some((left, a, right, b)) = stack.pop() {
        if !seen.insert((left.id(), a, right.id(), b)) {
            continue;
        }
        if a.start != b.start || a.next_input != b.next_input || left.tag(&a) != right.tag(&b) {
            return false;
        }
        if left.tree.leaf_end(&a) != right.tree.leaf_end(&b)
            || !left.same_nodes(left.tree.skip_after(&a), &right, right.tree.skip_after(&b))
        {
            return false;
        }
        match (left.tree.embedded(&a), right.tree.embedded(&b)) {
            (Some(ea), Some(eb)) => {
                let inner_left = Side {
                    rule_set: &ea.rule_set,
                    tree: &ea.tree,
                };
                let inner_right = Side {
                    rule_set: &eb.rule_set,
                    tree: &eb.tree,
                };
                if !push_tree(&mut stack, inner_left, inner_right) {
                    return false;
                }
            }
            (None, None) => {}
            _ => return false,
        }
        let alternatives_a = left.tree.alternatives(&a);
        let alternatives_b = right.tree.alternatives(&b);
        if alternatives_a.len() != alternatives_b.len() {
            return false;
        }
        for (x, y) in alternatives_a.iter().zip(alternatives_b) {
            if x.option != y.option || x.children.len() != y.children.len() {
                return false;
            }
            for (cx, cy) in x.children.iter().zip(&y.children) {
                stack.push((left, *cx, right, *cy));
            }
        }
    }
    true
}

impl fmt::Display for Sppt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_indented("  ", false))
    }
}
