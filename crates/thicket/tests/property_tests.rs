//! Property-based tests for the parser
//!
//! Random sentences of an expression language must parse, rebuild their
//! text exactly and give equal forests on every parse.

#![cfg(test)]

use proptest::prelude::*;
use std::sync::Arc;
use thicket::parser::{ParseOptions, Parser};
use thicket::rule::{RuleExpr, RuleSet, RuleSetBuilder};
use thicket::scanner::ScannerMode;

fn expressions() -> Arc<RuleSet> {
    RuleSetBuilder::new("Expr")
        .rule(
            "E",
            RuleExpr::longest([RuleExpr::rule("NUM"), RuleExpr::rule("Group"), RuleExpr::rule("Bin")]),
        )
        .rule(
            "Group",
            RuleExpr::seq([RuleExpr::literal("("), RuleExpr::rule("E"), RuleExpr::literal(")")]),
        )
        .rule(
            "Bin",
            RuleExpr::seq([
                RuleExpr::rule("E"),
                RuleExpr::longest([RuleExpr::literal("+"), RuleExpr::literal("*")]),
                RuleExpr::rule("E"),
            ]),
        )
        .rule("NUM", RuleExpr::pattern("[0-9]+"))
        .skip("WS", RuleExpr::pattern(" +"))
        .build()
        .unwrap()
}

fn expression() -> impl Strategy<Value = String> {
    "[0-9]{1,3}".prop_recursive(4, 16, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| format!("({e})")),
            (inner.clone(), prop_oneof![Just("+"), Just(" * ")], inner)
                .prop_map(|(l, op, r)| format!("{l}{op}{r}")),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_valid_expressions_parse(text in expression()) {
        let parser = Parser::new(expressions());
        let result = parser.parse_for_goal("E", &text).unwrap();
        prop_assert!(result.is_success(), "{text} failed: {:?}", result.issues.iter().collect::<Vec<_>>());
        let sppt = result.sppt.unwrap();
        prop_assert_eq!(sppt.to_text(), text.clone());
        prop_assert!(sppt.count_trees() >= 1);
    }

    #[test]
    fn prop_parsing_is_deterministic(text in expression()) {
        let parser = Parser::new(expressions());
        let first = parser.parse_for_goal("E", &text).unwrap().sppt;
        let second = Parser::new(expressions()).parse_for_goal("E", &text).unwrap().sppt;
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_scanner_modes_agree(text in expression()) {
        let parser = Parser::new(expressions());
        let on_demand = parser.parse_for_goal("E", &text).unwrap().sppt;
        let classic = parser
            .parse(&text, &ParseOptions::default().scanner_mode(ScannerMode::Classic))
            .unwrap()
            .sppt;
        prop_assert_eq!(on_demand, classic);
    }

    #[test]
    fn prop_arbitrary_text_never_panics(text in "[0-9()+* x]{0,24}") {
        let parser = Parser::new(expressions());
        let result = parser.parse_for_goal("E", &text).unwrap();
        if result.is_success() {
            prop_assert_eq!(result.sppt.unwrap().to_text(), text);
        } else {
            prop_assert!(result.issues.has_errors());
        }
    }
}
