//! End-to-end parsing tests

use std::sync::{Arc, OnceLock};
use thicket::error::{Issue, IssueData, IssueKind};
use thicket::ParserError;
use thicket::parser::{InterruptHandle, ParseOptions, ParseStatus, Parser};
use thicket::scanner::ScannerMode;
use thicket::rule::{PatternEngine, PatternError, PatternMatcher, RuleExpr, RuleSet, RuleSetBuilder};

fn expected_tags(issue: &Issue) -> Vec<&str> {
    issue.expected().unwrap_or_default().iter().map(|tag| tag.as_str()).collect()
}

fn left_recursive() -> Arc<RuleSet> {
    RuleSetBuilder::new("LeftRec")
        .rule("S", RuleExpr::longest([RuleExpr::literal("a"), RuleExpr::rule("S1")]))
        .rule("S1", RuleExpr::seq([RuleExpr::rule("S"), RuleExpr::literal("a")]))
        .build()
        .unwrap()
}

#[test]
fn test_left_recursion_gives_single_tree() {
    let parser = Parser::new(left_recursive());
    let result = parser.parse_for_goal("S", "aa").unwrap();
    assert_eq!(result.status, ParseStatus::Success);
    let sppt = result.sppt.unwrap();
    assert_eq!(sppt.count_trees(), 1);
    assert!(!sppt.is_ambiguous());
    assert_eq!(
        sppt.to_string(),
        "S|1 {\n  S1 {\n    S {\n      'a'\n    }\n    'a'\n  }\n}\n"
    );
}

#[test]
fn test_left_recursion_longer_input() {
    let parser = Parser::new(left_recursive());
    let text = "a".repeat(50);
    let result = parser.parse_for_goal("S", &text).unwrap();
    let sppt = result.sppt.unwrap();
    assert_eq!(sppt.count_trees(), 1);
    assert_eq!(sppt.to_text(), text);
}

#[test]
fn test_deep_right_recursion() {
    let rules = RuleSetBuilder::new("RightRec")
        .rule("S", RuleExpr::longest([RuleExpr::literal("a"), RuleExpr::rule("S1")]))
        .rule("S1", RuleExpr::seq([RuleExpr::literal("a"), RuleExpr::rule("S")]))
        .build()
        .unwrap();
    let parser = Parser::new(rules);
    let text = "a".repeat(2000);
    let result = parser.parse_for_goal("S", &text).unwrap();
    assert!(result.is_success());
    let sppt = result.sppt.unwrap();
    assert_eq!(sppt.count_trees(), 1);
    assert_eq!(sppt.leaves().len(), 2000);
}

#[test]
fn test_ambiguous_choice_keeps_every_tree() {
    let rules = RuleSetBuilder::new("Amb")
        .rule("S", RuleExpr::ambiguous([RuleExpr::rule("A"), RuleExpr::rule("B")]))
        .rule("A", RuleExpr::literal("x"))
        .rule("B", RuleExpr::literal("x"))
        .build()
        .unwrap();
    let parser = Parser::new(rules);
    let options = ParseOptions::default().report_ambiguities(true);
    let result = parser.parse("x", &options).unwrap();
    let sppt = result.sppt.as_ref().unwrap();
    assert!(sppt.is_ambiguous());
    assert_eq!(sppt.count_trees(), 2);

    let warnings: Vec<_> = result
        .issues
        .iter()
        .filter(|issue| issue.kind == IssueKind::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].data,
        Some(IssueData::Ambiguity {
            rule: "S".into(),
            options: vec![0, 1],
        })
    );
}

#[test]
fn test_priority_choice_keeps_first_option() {
    let rules = RuleSetBuilder::new("Prio")
        .rule("S", RuleExpr::priority([RuleExpr::rule("A"), RuleExpr::rule("B")]))
        .rule("A", RuleExpr::literal("x"))
        .rule("B", RuleExpr::literal("x"))
        .build()
        .unwrap();
    let sppt = Parser::new(rules).parse_for_goal("S", "x").unwrap().sppt.unwrap();
    assert_eq!(sppt.count_trees(), 1);
    assert_eq!(sppt.to_string(), "S {\n  A : 'x'\n}\n");
}

#[test]
fn test_longest_match_prefers_longer_child() {
    let rules = RuleSetBuilder::new("Longest")
        .rule("S", RuleExpr::many1(RuleExpr::rule("W")))
        .rule("W", RuleExpr::longest([RuleExpr::literal("a"), RuleExpr::literal("aa")]))
        .build()
        .unwrap();
    let sppt = Parser::new(rules).parse_for_goal("S", "aa").unwrap().sppt.unwrap();
    assert_eq!(sppt.count_trees(), 1);
    let leaves: Vec<String> = sppt.leaves().into_iter().map(|leaf| leaf.text.to_string()).collect();
    assert_eq!(leaves, ["aa"]);
}

#[test]
fn test_longest_match_through_wrapper_rule() {
    let rules = RuleSetBuilder::new("Wrapped")
        .rule(
            "S",
            RuleExpr::seq([RuleExpr::rule("W"), RuleExpr::optional(RuleExpr::literal("b"))]),
        )
        .rule("W", RuleExpr::rule("X"))
        .rule(
            "X",
            RuleExpr::longest([
                RuleExpr::literal("a"),
                RuleExpr::seq([RuleExpr::literal("a"), RuleExpr::literal("b")]),
            ]),
        )
        .build()
        .unwrap();
    let sppt = Parser::new(rules).parse_for_goal("S", "ab").unwrap().sppt.unwrap();
    assert_eq!(sppt.count_trees(), 1);
    let root = sppt.root();
    let alternatives = sppt.tree().alternatives(&root);
    assert_eq!(alternatives.len(), 1);
    let wrapper = alternatives[0].children[0];
    assert_eq!(sppt.rule(&wrapper).tag(), "W");
    assert_eq!(sppt.matched_text(&wrapper), "ab");
}

#[test]
fn test_shorter_longest_match_survives_where_needed() {
    let rules = RuleSetBuilder::new("Needed")
        .rule("S", RuleExpr::seq([RuleExpr::rule("X"), RuleExpr::literal("b")]))
        .rule(
            "X",
            RuleExpr::longest([
                RuleExpr::literal("a"),
                RuleExpr::seq([RuleExpr::literal("a"), RuleExpr::literal("b")]),
            ]),
        )
        .build()
        .unwrap();
    let result = Parser::new(rules).parse_for_goal("S", "ab").unwrap();
    assert!(result.is_success());
    let sppt = result.sppt.unwrap();
    assert_eq!(sppt.count_trees(), 1);
    assert_eq!(sppt.to_text(), "ab");
}

#[test]
fn test_failure_reports_position_and_expected() {
    let rules = RuleSetBuilder::new("Abc")
        .rule(
            "S",
            RuleExpr::seq([RuleExpr::literal("a"), RuleExpr::literal("b"), RuleExpr::literal("c")]),
        )
        .build()
        .unwrap();
    let result = Parser::new(rules).parse_for_goal("S", "ab").unwrap();
    assert_eq!(result.status, ParseStatus::Failure);
    assert!(result.sppt.is_none());

    let errors: Vec<_> = result.issues.errors().collect();
    assert_eq!(errors.len(), 1);
    let location = errors[0].location.unwrap();
    assert_eq!((location.line, location.column), (1, 3));
    assert_eq!(expected_tags(errors[0]), ["'c'"]);
    assert!(errors[0].message.starts_with("Failed to match {'c'}"));
}

#[test]
fn test_failure_expects_end_of_text() {
    let rules = RuleSetBuilder::new("Ab")
        .rule("S", RuleExpr::literal("a"))
        .build()
        .unwrap();
    let result = Parser::new(rules).parse_for_goal("S", "aa").unwrap();
    let error = result.issues.errors().next().unwrap();
    assert_eq!(error.location.map(|l| l.column), Some(2));
    assert_eq!(expected_tags(error), ["<EOT>"]);
}

#[test]
fn test_failure_without_report() {
    let rules = RuleSetBuilder::new("Ab")
        .rule("S", RuleExpr::literal("a"))
        .build()
        .unwrap();
    let options = ParseOptions::default().report_errors(false);
    let result = Parser::new(rules).parse("b", &options).unwrap();
    assert_eq!(result.status, ParseStatus::Failure);
    assert!(result.issues.is_empty());
}

#[test]
fn test_skip_is_attached_to_leaves() {
    let rules = RuleSetBuilder::new("Class")
        .rule(
            "S",
            RuleExpr::seq([RuleExpr::literal("class"), RuleExpr::rule("NAME"), RuleExpr::literal(";")]),
        )
        .rule("NAME", RuleExpr::pattern("[A-Za-z]+"))
        .skip("WS", RuleExpr::pattern(r"\s+"))
        .build()
        .unwrap();
    let sppt = Parser::new(rules).parse_for_goal("S", "class  A;").unwrap().sppt.unwrap();

    let leaves = sppt.leaves();
    let visible: Vec<(&str, &str)> = leaves
        .iter()
        .filter(|leaf| !leaf.is_skip)
        .map(|leaf| (leaf.tag.as_str(), leaf.text.as_str()))
        .collect();
    assert_eq!(visible, [("'class'", "class"), ("NAME", "A"), ("';'", ";")]);

    let skip: Vec<&str> = leaves
        .iter()
        .filter(|leaf| leaf.is_skip)
        .map(|leaf| leaf.text.as_str())
        .collect();
    assert_eq!(skip, ["  "]);

    let root = sppt.root();
    let first = &sppt.tree().alternatives(&root)[0].children[0];
    assert_eq!(sppt.tree().skip_after(first).len(), 1);
    assert_eq!(sppt.matched_text(first), "class  ");
    assert_eq!(sppt.to_text(), "class  A;");
}

#[test]
fn test_leading_and_trailing_skip() {
    let rules = RuleSetBuilder::new("Ws")
        .rule("S", RuleExpr::literal("x"))
        .skip("WS", RuleExpr::pattern(r"\s+"))
        .build()
        .unwrap();
    let sppt = Parser::new(rules).parse_for_goal("S", "  x \n").unwrap().sppt.unwrap();
    assert_eq!(sppt.tree().initial_skip().len(), 1);
    assert_eq!(sppt.to_text(), "  x \n");
    assert_eq!(sppt.to_string_indented("  ", true), "WS : '  '\nS : 'x'\nWS : ' \\n'\n");
}

#[test]
fn test_optional_and_lists() {
    let rules = RuleSetBuilder::new("Lists")
        .rule(
            "S",
            RuleExpr::seq([
                RuleExpr::optional(RuleExpr::literal("-")),
                RuleExpr::separated(RuleExpr::rule("N"), RuleExpr::literal(","), 1, Some(3)),
            ]),
        )
        .rule("N", RuleExpr::pattern("[0-9]+"))
        .build()
        .unwrap();
    let parser = Parser::new(rules);
    assert!(parser.parse_for_goal("S", "1").unwrap().is_success());
    assert!(parser.parse_for_goal("S", "-1,2,3").unwrap().is_success());
    assert!(!parser.parse_for_goal("S", "1,2,3,4").unwrap().is_success());
    assert!(!parser.parse_for_goal("S", "1,").unwrap().is_success());
    assert!(!parser.parse_for_goal("S", "").unwrap().is_success());
}

#[test]
fn test_list_minimum() {
    let rules = RuleSetBuilder::new("Min")
        .rule("S", RuleExpr::list(RuleExpr::literal("a"), 2, None))
        .build()
        .unwrap();
    let parser = Parser::new(rules);
    assert!(!parser.parse_for_goal("S", "a").unwrap().is_success());
    assert!(parser.parse_for_goal("S", "aa").unwrap().is_success());
    assert!(parser.parse_for_goal("S", "aaaaa").unwrap().is_success());
}

#[test]
fn test_empty_input_with_nullable_goal() {
    let rules = RuleSetBuilder::new("Empty")
        .rule("S", RuleExpr::many(RuleExpr::literal("a")))
        .build()
        .unwrap();
    let result = Parser::new(rules).parse_for_goal("S", "").unwrap();
    assert!(result.is_success());
    assert_eq!(result.sppt.unwrap().to_text(), "");
}

#[test]
fn test_embedded_rule_set() {
    let inner = RuleSetBuilder::new("Inner")
        .rule("E", RuleExpr::separated(RuleExpr::rule("NUM"), RuleExpr::literal("+"), 1, None))
        .rule("NUM", RuleExpr::pattern("[0-9]+"))
        .build()
        .unwrap();
    let outer = RuleSetBuilder::new("Outer")
        .rule(
            "S",
            RuleExpr::seq([RuleExpr::literal("<"), RuleExpr::rule("Inner"), RuleExpr::literal(">")]),
        )
        .rule("Inner", RuleExpr::embedded(Arc::clone(&inner), "E"))
        .build()
        .unwrap();
    let result = Parser::new(outer).parse_for_goal("S", "<1+22>").unwrap();
    assert!(result.is_success());
    let sppt = result.sppt.unwrap();
    assert_eq!(sppt.to_text(), "<1+22>");
    assert_eq!(
        sppt.to_string(),
        "S {\n  '<'\n  Inner {\n    E {\n      NUM : '1'\n      '+'\n      NUM : '22'\n    }\n  }\n  '>'\n}\n"
    );
    let tags: Vec<String> = sppt.leaves().into_iter().map(|leaf| leaf.tag.to_string()).collect();
    assert_eq!(tags, ["'<'", "NUM", "'+'", "NUM", "'>'"]);
}

#[test]
fn test_embedded_match_yields_to_host_lookahead() {
    let inner = RuleSetBuilder::new("Run")
        .rule("X", RuleExpr::many1(RuleExpr::literal("a")))
        .build()
        .unwrap();
    let outer = RuleSetBuilder::new("Host")
        .rule("S", RuleExpr::seq([RuleExpr::rule("Emb"), RuleExpr::literal("a")]))
        .rule("Emb", RuleExpr::embedded(inner, "X"))
        .build()
        .unwrap();
    let result = Parser::new(outer).parse_for_goal("S", "aaa").unwrap();
    assert!(result.is_success());
    let sppt = result.sppt.unwrap();
    assert_eq!(sppt.count_trees(), 1);
    let root = sppt.root();
    let embedded = sppt.tree().alternatives(&root)[0].children[0];
    assert_eq!(sppt.rule(&embedded).tag(), "Emb");
    assert_eq!(sppt.matched_text(&embedded), "aa");
    assert_eq!(sppt.leaves().len(), 3);
}

#[test]
fn test_unknown_goal_is_an_error() {
    let parser = Parser::new(left_recursive());
    let err = parser.parse_for_goal("Missing", "a").unwrap_err();
    assert!(matches!(err, thicket::ParserError::UnknownGoalRule { .. }));
}

#[test]
fn test_default_goal_is_first_rule() {
    let parser = Parser::new(left_recursive());
    let sppt = parser.parse("a", &ParseOptions::default()).unwrap().sppt.unwrap();
    assert_eq!(sppt.rule(&sppt.root()).tag(), "S");
}

#[test]
fn test_repeated_parses_are_equal() {
    let parser = Parser::new(left_recursive());
    let first = parser.parse_for_goal("S", "aaaa").unwrap().sppt.unwrap();
    let second = parser.parse_for_goal("S", "aaaa").unwrap().sppt.unwrap();
    assert_eq!(first, second);
    let other = parser.parse_for_goal("S", "aaa").unwrap().sppt.unwrap();
    assert_ne!(first, other);
}

#[test]
fn test_metrics_are_filled() {
    let parser = Parser::new(left_recursive());
    let result = parser.parse_for_goal("S", "aaa").unwrap();
    assert!(result.metrics.growing_nodes > 0);
    assert!(result.metrics.leaves >= 3);
    assert!(result.metrics.levels > 0);
}

fn keywords() -> Arc<RuleSet> {
    RuleSetBuilder::new("Keywords")
        .rule(
            "S",
            RuleExpr::many1(RuleExpr::longest([RuleExpr::literal("if"), RuleExpr::rule("ID")])),
        )
        .rule("ID", RuleExpr::pattern("[a-z]+"))
        .skip("WS", RuleExpr::pattern(" +"))
        .build()
        .unwrap()
}

#[test]
fn test_classic_scanner_parses() {
    let parser = Parser::new(keywords());
    let options = ParseOptions::default().scanner_mode(ScannerMode::Classic);
    let result = parser.parse("if abc", &options).unwrap();
    assert!(result.is_success());
    let tags: Vec<String> = result
        .sppt
        .unwrap()
        .leaves()
        .into_iter()
        .filter(|leaf| !leaf.is_skip)
        .map(|leaf| leaf.tag.to_string())
        .collect();
    assert_eq!(tags, ["'if'", "ID"]);
}

#[test]
fn test_classic_scanner_rejects_embedded_rule_sets() {
    let inner = RuleSetBuilder::new("Inner")
        .rule("X", RuleExpr::literal("x"))
        .build()
        .unwrap();
    let outer = RuleSetBuilder::new("Outer")
        .rule("S", RuleExpr::embedded(inner, "X"))
        .build()
        .unwrap();
    let parser = Parser::new(outer);
    let options = ParseOptions::default().scanner_mode(ScannerMode::Classic);
    assert!(matches!(
        parser.parse("x", &options),
        Err(ParserError::ClassicScanUnsupported { .. })
    ));
    assert!(matches!(parser.scan("x"), Err(ParserError::ClassicScanUnsupported { .. })));
    assert!(parser.parse_for_goal("S", "x").unwrap().is_success());
}

#[test]
fn test_scan_marks_unknown_text() {
    let parser = Parser::new(keywords());
    let scanned = parser.scan("if 9 x").unwrap();
    let tokens: Vec<(String, String)> = scanned
        .tokens
        .iter()
        .map(|token| (token.tag.to_string(), token.text.to_string()))
        .collect();
    assert_eq!(
        tokens,
        [
            ("'if'".to_string(), "if".to_string()),
            ("WS".to_string(), " ".to_string()),
            ("<UNKNOWN>".to_string(), "9".to_string()),
            ("WS".to_string(), " ".to_string()),
            ("ID".to_string(), "x".to_string()),
        ]
    );
    assert!(scanned.issues.has_errors());
}

/// Matches `[a-z]` and interrupts its parser when it first sees `stop_at`.
#[derive(Debug)]
struct InterruptingMatcher {
    handle: OnceLock<InterruptHandle>,
    stop_at: usize,
}

impl PatternMatcher for InterruptingMatcher {
    fn match_at(&self, text: &str, position: usize) -> Option<usize> {
        if position == self.stop_at
            && let Some(handle) = self.handle.get()
        {
            handle.interrupt("user cancelled");
        }
        let next = text[position..].chars().next()?;
        next.is_ascii_lowercase().then_some(position + 1)
    }
}

struct InterruptingEngine(Arc<InterruptingMatcher>);

impl PatternEngine for InterruptingEngine {
    fn compile(&self, _pattern: &str) -> Result<Arc<dyn PatternMatcher>, PatternError> {
        Ok(Arc::clone(&self.0) as Arc<dyn PatternMatcher>)
    }
}

fn interrupting_parser(stop_at: usize) -> (Parser, Arc<InterruptingMatcher>) {
    let matcher = Arc::new(InterruptingMatcher {
        handle: OnceLock::new(),
        stop_at,
    });
    let rules = RuleSetBuilder::new("Letters")
        .rule("S", RuleExpr::many1(RuleExpr::rule("L")))
        .rule("L", RuleExpr::pattern("[a-z]"))
        .pattern_engine(Arc::new(InterruptingEngine(Arc::clone(&matcher))))
        .build()
        .unwrap();
    let parser = Parser::new(rules);
    matcher.handle.set(parser.interrupt_handle()).unwrap();
    (parser, matcher)
}

#[test]
fn test_interrupt_stops_one_parse() {
    let (parser, _matcher) = interrupting_parser(1);
    let result = parser.parse_for_goal("S", "abc").unwrap();
    assert_eq!(
        result.status,
        ParseStatus::Interrupted {
            reason: "user cancelled".to_string()
        }
    );
    assert!(result.sppt.is_none());
    assert!(!parser.interrupt_handle().is_pending());

    let again = parser.parse_for_goal("S", "x").unwrap();
    assert!(again.is_success());
}

#[test]
fn test_unobserved_interrupt_does_not_stop_next_parse() {
    // the request comes at the last level, after its check
    let (parser, _matcher) = interrupting_parser(2);
    let result = parser.parse_for_goal("S", "ab").unwrap();
    assert!(result.is_success());
    assert!(!parser.interrupt_handle().is_pending());

    let next = parser.parse_for_goal("S", "x").unwrap();
    assert!(next.is_success());
}

#[test]
fn test_interrupt_between_parses_is_dropped() {
    let parser = Parser::new(left_recursive());
    let handle = parser.interrupt_handle();
    std::thread::spawn(move || handle.interrupt("timeout"))
        .join()
        .unwrap();
    assert!(!parser.interrupt_handle().is_pending());
    let result = parser.parse_for_goal("S", "a").unwrap();
    assert!(result.is_success());
}
