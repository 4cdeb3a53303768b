//! Depth-first traversal of a forest.
//!
//! [`Sppt::traverse`] drives an [`SpptWalker`] over every node, every
//! alternative of an ambiguous node and every embedded tree. The walk uses
//! an explicit stack, so deep trees do not overflow the call stack.
//! Returning [`ControlFlow::Break`] from any callback stops the walk.

use super::{Sppt, SpptNode, TreeData};
use crate::rule::{Rule, RuleSet};
use std::ops::ControlFlow;

/// A node together with the rule set, tree and text it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    rule_set: &'a RuleSet,
    tree: &'a TreeData,
    text: &'a str,
    node: SpptNode,
}

impl<'a> NodeRef<'a> {
    pub(crate) const fn new(
        rule_set: &'a RuleSet,
        tree: &'a TreeData,
        text: &'a str,
        node: SpptNode,
    ) -> Self {
        Self {
            rule_set,
            tree,
            text,
            node,
        }
    }

    #[must_use]
    pub const fn node(&self) -> SpptNode {
        self.node
    }

    #[must_use]
    pub fn rule(&self) -> &'a Rule {
        self.rule_set.rule(self.node.rule)
    }

    #[must_use]
    pub fn tag(&self) -> &'a str {
        self.rule().tag()
    }

    #[must_use]
    pub const fn rule_set(&self) -> &'a RuleSet {
        self.rule_set
    }

    #[must_use]
    pub const fn tree(&self) -> &'a TreeData {
        self.tree
    }

    #[must_use]
    pub const fn start(&self) -> usize {
        self.node.start
    }

    #[must_use]
    pub const fn next_input(&self) -> usize {
        self.node.next_input
    }

    /// Matched text including any trailing skip.
    #[must_use]
    pub fn matched_text(&self) -> &'a str {
        &self.text[self.node.start..self.node.next_input]
    }

    /// For a leaf, its own text without the skip that follows it.
    #[must_use]
    pub fn leaf_text(&self) -> Option<&'a str> {
        let end = self.tree.leaf_end(&self.node)?;
        Some(&self.text[self.node.start..end])
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.tree.is_leaf(&self.node)
    }

    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.tree.alternatives(&self.node).len() > 1
    }

    const fn with(&self, node: SpptNode) -> Self {
        Self { node, ..*self }
    }

    fn key(&self) -> (usize, SpptNode) {
        (std::ptr::from_ref(self.tree) as usize, self.node)
    }
}

/// Callbacks for [`Sppt::traverse`]. Every method defaults to continuing.
pub trait SpptWalker {
    fn begin_tree(&mut self) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn end_tree(&mut self) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Entering alternative `index` of `total` for a branch node.
    fn begin_branch(&mut self, node: NodeRef<'_>, option: u32, index: usize, total: usize) -> ControlFlow<()> {
        let _ = (node, option, index, total);
        ControlFlow::Continue(())
    }

    fn end_branch(&mut self, node: NodeRef<'_>, option: u32, index: usize, total: usize) -> ControlFlow<()> {
        let _ = (node, option, index, total);
        ControlFlow::Continue(())
    }

    /// Entering the tree of an embedded rule set; `node` is the hosting leaf.
    fn begin_embedded(&mut self, node: NodeRef<'_>) -> ControlFlow<()> {
        let _ = node;
        ControlFlow::Continue(())
    }

    fn end_embedded(&mut self, node: NodeRef<'_>) -> ControlFlow<()> {
        let _ = node;
        ControlFlow::Continue(())
    }

    fn leaf(&mut self, node: NodeRef<'_>) -> ControlFlow<()> {
        let _ = node;
        ControlFlow::Continue(())
    }

    fn skip(&mut self, node: NodeRef<'_>) -> ControlFlow<()> {
        let _ = node;
        ControlFlow::Continue(())
    }

    /// A node that cannot be walked: a cycle or a branch without children
    /// data. `path` computes the chain of open branches leading to it.
    fn tree_error(&mut self, message: &str, path: &dyn Fn() -> Vec<SpptNode>) -> ControlFlow<()> {
        let _ = (message, path);
        ControlFlow::Continue(())
    }
}

enum Frame<'a> {
    Visit(NodeRef<'a>),
    Skip(NodeRef<'a>),
    BeginBranch {
        node: NodeRef<'a>,
        option: u32,
        index: usize,
        total: usize,
    },
    EndBranch {
        node: NodeRef<'a>,
        option: u32,
        index: usize,
        total: usize,
    },
    BeginEmbedded(NodeRef<'a>),
    EndEmbedded(NodeRef<'a>),
}

impl Sppt {
    /// Walks the forest depth-first, left to right.
    pub fn traverse<W: SpptWalker + ?Sized>(&self, walker: &mut W) -> ControlFlow<()> {
        walker.begin_tree()?;
        let mut stack = Vec::new();
        push_tree(&mut stack, &self.rule_set, &self.tree, &self.text);
        // open branches and embedded hosts, tagged with the tree they belong to
        let mut path: Vec<(usize, SpptNode)> = Vec::new();

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Skip(node) => walker.skip(node)?,
                Frame::BeginBranch {
                    node,
                    option,
                    index,
                    total,
                } => {
                    path.push(node.key());
                    walker.begin_branch(node, option, index, total)?;
                }
                Frame::EndBranch {
                    node,
                    option,
                    index,
                    total,
                } => {
                    path.pop();
                    walker.end_branch(node, option, index, total)?;
                }
                Frame::BeginEmbedded(node) => {
                    path.push(node.key());
                    walker.begin_embedded(node)?;
                }
                Frame::EndEmbedded(node) => {
                    path.pop();
                    walker.end_embedded(node)?;
                }
                Frame::Visit(node) => {
                    if path.contains(&node.key()) {
                        let snapshot = || path_nodes(&path);
                        walker.tree_error("cyclic derivation", &snapshot)?;
                        continue;
                    }
                    visit(&mut stack, walker, node, &path)?;
                }
            }
        }
        walker.end_tree()
    }
}

fn path_nodes(path: &[(usize, SpptNode)]) -> Vec<SpptNode> {
    path.iter().map(|(_, node)| *node).collect()
}

fn push_tree<'a>(stack: &mut Vec<Frame<'a>>, rule_set: &'a RuleSet, tree: &'a TreeData, text: &'a str) {
    if let Some(root) = tree.root() {
        stack.push(Frame::Visit(NodeRef::new(rule_set, tree, text, root)));
    }
    for skip in tree.initial_skip().iter().rev() {
        stack.push(Frame::Skip(NodeRef::new(rule_set, tree, text, *skip)));
    }
}

fn visit<'a, W: SpptWalker + ?Sized>(
    stack: &mut Vec<Frame<'a>>,
    walker: &mut W,
    node: NodeRef<'a>,
    path: &[(usize, SpptNode)],
) -> ControlFlow<()> {
    let tree = node.tree;
    if tree.is_leaf(&node.node) {
        for skip in tree.skip_after(&node.node).iter().rev() {
            stack.push(Frame::Skip(node.with(*skip)));
        }
        if let Some(embedded) = tree.embedded(&node.node) {
            stack.push(Frame::EndEmbedded(node));
            push_tree(stack, embedded.rule_set(), embedded.tree(), node.text);
            stack.push(Frame::BeginEmbedded(node));
            return ControlFlow::Continue(());
        }
        return walker.leaf(node);
    }

    let alternatives = tree.alternatives(&node.node);
    if alternatives.is_empty() {
        let snapshot = || path_nodes(path);
        return walker.tree_error("node has neither alternatives nor leaf data", &snapshot);
    }
    let total = alternatives.len();
    for (index, alternative) in alternatives.iter().enumerate().rev() {
        let option = alternative.option;
        stack.push(Frame::EndBranch {
            node,
            option,
            index,
            total,
        });
        for child in alternative.children.iter().rev() {
            stack.push(Frame::Visit(node.with(*child)));
        }
        stack.push(Frame::BeginBranch {
            node,
            option,
            index,
            total,
        });
    }
    ControlFlow::Continue(())
}
