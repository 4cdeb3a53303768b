use super::walker::NodeRef;
use super::{Sppt, TreeData};
use crate::error::{InputLocation, LineIndex};
use crate::rule::{RuleId, RuleSet};
use compact_str::CompactString;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A leaf of the first tree, or a token of a classic scan.
///
/// `rule` refers to the rule set that defines the leaf, which for embedded
/// trees is the embedded rule set. Tokens of unrecognized text have no rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct LeafToken {
    pub rule: Option<RuleId>,
    pub tag: CompactString,
    pub is_skip: bool,
    pub location: InputLocation,
    pub text: CompactString,
}

impl LeafToken {
    pub(crate) fn new(
        rule: Option<RuleId>,
        tag: &str,
        is_skip: bool,
        location: InputLocation,
        text: &str,
    ) -> Self {
        Self {
            rule,
            tag: CompactString::from(tag),
            is_skip,
            location,
            text: CompactString::from(text),
        }
    }

    fn from_node(node: NodeRef<'_>, is_skip: bool, index: &LineIndex) -> Self {
        let text = node.leaf_text().unwrap_or_else(|| node.matched_text());
        Self::new(
            Some(node.node().rule),
            node.tag(),
            is_skip,
            index.location(node.start(), text.len()),
            text,
        )
    }
}

enum Pending<'a> {
    Node(NodeRef<'a>),
    Skip(NodeRef<'a>),
}

fn push_tree<'a>(stack: &mut Vec<Pending<'a>>, rule_set: &'a RuleSet, tree: &'a TreeData, text: &'a str) {
    if let Some(root) = tree.root() {
        stack.push(Pending::Node(NodeRef::new(rule_set, tree, text, root)));
    }
    for skip in tree.initial_skip().iter().rev() {
        stack.push(Pending::Skip(NodeRef::new(rule_set, tree, text, *skip)));
    }
}

impl Sppt {
    /// Leaves of the first tree in text order, skip leaves and the leaves of
    /// embedded trees included.
    #[must_use]
    pub fn leaves(&self) -> Vec<LeafToken> {
        let index = LineIndex::new(&self.text);
        let mut out = Vec::new();
        let mut stack = Vec::new();
        push_tree(&mut stack, &self.rule_set, &self.tree, &self.text);

        while let Some(pending) = stack.pop() {
            let node = match pending {
                Pending::Skip(node) => {
                    out.push(LeafToken::from_node(node, true, &index));
                    continue;
                }
                Pending::Node(node) => node,
            };
            let tree = node.tree();
            let key = node.node();
            if tree.is_leaf(&key) {
                for skip in tree.skip_after(&key).iter().rev() {
                    stack.push(Pending::Skip(NodeRef::new(node.rule_set(), tree, &self.text, *skip)));
                }
                match tree.embedded(&key) {
                    Some(embedded) => {
                        push_tree(&mut stack, embedded.rule_set(), embedded.tree(), &self.text);
                    }
                    None => out.push(LeafToken::from_node(node, false, &index)),
                }
                continue;
            }
            if let Some(first) = tree.alternatives(&key).first() {
                for child in first.children.iter().rev() {
                    stack.push(Pending::Node(NodeRef::new(node.rule_set(), tree, &self.text, *child)));
                }
            }
        }
        out
    }

    /// Leaves of the first tree grouped by zero-based source line.
    ///
    /// A leaf spanning a line break is split, each piece keeping the line
    /// terminator of its own line.
    #[must_use]
    pub fn tokens_by_line(&self) -> Vec<Vec<LeafToken>> {
        split_by_line(&self.text, self.leaves())
    }
}

pub(crate) fn split_by_line(text: &str, tokens: Vec<LeafToken>) -> Vec<Vec<LeafToken>> {
    let index = LineIndex::new(text);
    let mut lines: Vec<Vec<LeafToken>> = vec![Vec::new(); index.line_count()];
    for token in tokens {
        let start = token.location.position;
        let end = start + token.text.len();
        let first_line = index.line_of(start);
        let fits = index
            .line_start(first_line + 1)
            .is_none_or(|next| end <= next);
        if fits {
            lines[first_line].push(token);
            continue;
        }
        let mut from = start;
        let mut line = first_line;
        while from < end {
            let to = index.line_start(line + 1).map_or(end, |next| next.min(end));
            lines[line].push(LeafToken {
                location: index.location(from, to - from),
                text: CompactString::from(&text[from..to]),
                ..token.clone()
            });
            from = to;
            line += 1;
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use crate::parser::Parser;
    use crate::rule::{RuleExpr, RuleSetBuilder};

    #[test]
    fn splits_multiline_skip() {
        let rules = RuleSetBuilder::new("Lines")
            .rule("S", RuleExpr::many1(RuleExpr::rule("W")))
            .rule("W", RuleExpr::pattern("[a-z]+"))
            .skip("WS", RuleExpr::pattern(r"\s+"))
            .build()
            .unwrap();
        let sppt = Parser::new(rules)
            .parse_for_goal("S", "ab \n cd")
            .unwrap()
            .sppt
            .unwrap();

        let lines = sppt.tokens_by_line();
        assert_eq!(lines.len(), 2);
        let first: Vec<&str> = lines[0].iter().map(|t| t.text.as_str()).collect();
        let second: Vec<&str> = lines[1].iter().map(|t| t.text.as_str()).collect();
        assert_eq!(first, ["ab", " \n"]);
        assert_eq!(second, [" ", "cd"]);
        assert_eq!(lines[1][1].location.line, 2);
        assert_eq!(lines[1][1].location.column, 2);
        assert!(lines[1][0].is_skip);
        assert_eq!(sppt.to_text(), "ab \n cd");
    }
}
