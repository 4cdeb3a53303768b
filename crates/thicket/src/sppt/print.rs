use super::walker::{NodeRef, SpptWalker};
use super::Sppt;
use crate::rule::TerminalKind;
use std::fmt::Write;
use std::ops::ControlFlow;

impl Sppt {
    /// Renders the forest one node per line.
    ///
    /// Branches print as `Tag {` … `}`, with `|n` when option `n > 0`
    /// matched and `(i of n)` on ambiguous nodes. Literal leaves print as
    /// their literal, other leaves as `TAG : 'text'`.
    #[must_use]
    pub fn to_string_indented(&self, indent: &str, include_skip: bool) -> String {
        let mut printer = IndentPrinter {
            indent,
            include_skip,
            depth: 0,
            out: String::new(),
        };
        let _ = self.traverse(&mut printer);
        printer.out
    }
}

struct IndentPrinter<'i> {
    indent: &'i str,
    include_skip: bool,
    depth: usize,
    out: String,
}

impl IndentPrinter<'_> {
    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        for _ in 0..self.depth {
            self.out.push_str(self.indent);
        }
        let _ = self.out.write_fmt(args);
        self.out.push('\n');
    }

    fn terminal(&mut self, node: NodeRef<'_>) {
        let rule = node.rule();
        let text = node.leaf_text().unwrap_or_default();
        match rule.terminal() {
            Some(TerminalKind::Literal(_)) if rule.is_pseudo() => self.line(format_args!("{}", rule.tag())),
            Some(TerminalKind::Empty | TerminalKind::EndOfText) => self.line(format_args!("{}", rule.tag())),
            _ => self.line(format_args!("{} : '{}'", rule.tag(), escape(text))),
        }
    }
}

impl SpptWalker for IndentPrinter<'_> {
    fn begin_branch(&mut self, node: NodeRef<'_>, option: u32, index: usize, total: usize) -> ControlFlow<()> {
        let mut head = String::from(node.tag());
        if option > 0 {
            let _ = write!(head, "|{option}");
        }
        if total > 1 {
            let _ = write!(head, " ({} of {total})", index + 1);
        }
        self.line(format_args!("{head} {{"));
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn end_branch(&mut self, _: NodeRef<'_>, _: u32, _: usize, _: usize) -> ControlFlow<()> {
        self.depth = self.depth.saturating_sub(1);
        self.line(format_args!("}}"));
        ControlFlow::Continue(())
    }

    fn begin_embedded(&mut self, node: NodeRef<'_>) -> ControlFlow<()> {
        self.line(format_args!("{} {{", node.tag()));
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn end_embedded(&mut self, _: NodeRef<'_>) -> ControlFlow<()> {
        self.depth = self.depth.saturating_sub(1);
        self.line(format_args!("}}"));
        ControlFlow::Continue(())
    }

    fn leaf(&mut self, node: NodeRef<'_>) -> ControlFlow<()> {
        self.terminal(node);
        ControlFlow::Continue(())
    }

    fn skip(&mut self, node: NodeRef<'_>) -> ControlFlow<()> {
        if self.include_skip {
            self.terminal(node);
        }
        ControlFlow::Continue(())
    }

    fn tree_error(&mut self, message: &str, _: &dyn Fn() -> Vec<super::SpptNode>) -> ControlFlow<()> {
        self.line(format_args!("<error: {message}>"));
        ControlFlow::Continue(())
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::parser::Parser;
    use crate::rule::{RuleExpr, RuleSetBuilder};

    #[test]
    fn prints_nested_branches() {
        let rules = RuleSetBuilder::new("Test")
            .rule("S", RuleExpr::seq([RuleExpr::literal("a"), RuleExpr::rule("N")]))
            .rule("N", RuleExpr::pattern("[0-9]+"))
            .skip("WS", RuleExpr::pattern(r"\s+"))
            .build()
            .unwrap();
        let sppt = Parser::new(rules).parse_for_goal("S", "a 12").unwrap().sppt.unwrap();

        assert_eq!(sppt.to_string_indented("  ", false), "S {\n  'a'\n  N : '12'\n}\n");
        assert_eq!(
            sppt.to_string_indented("  ", true),
            "S {\n  'a'\n  WS : ' '\n  N : '12'\n}\n"
        );
        assert_eq!(sppt.to_string(), sppt.to_string_indented("  ", false));
    }

    #[test]
    fn escapes_control_characters() {
        assert_eq!(super::escape("a\n'b'"), "a\\n\\'b\\'");
    }
}
