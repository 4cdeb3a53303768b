//! Automaton construction tests
//!
//! An automaton built eagerly must equal one grown on demand by parsing
//! enough sentences to visit every state.

use std::sync::Arc;
use thicket::automaton::AutomatonKind;
use thicket::parser::Parser;
use thicket::rule::{RuleExpr, RuleSet, RuleSetBuilder};

fn choice_rules() -> Arc<RuleSet> {
    RuleSetBuilder::new("Choice")
        .rule(
            "S",
            RuleExpr::longest([
                RuleExpr::seq([RuleExpr::literal("a"), RuleExpr::literal("b")]),
                RuleExpr::seq([RuleExpr::literal("a"), RuleExpr::literal("c")]),
            ]),
        )
        .build()
        .unwrap()
}

fn recursive_rules() -> Arc<RuleSet> {
    RuleSetBuilder::new("Expr")
        .rule(
            "E",
            RuleExpr::longest([RuleExpr::rule("N"), RuleExpr::rule("Add")]),
        )
        .rule(
            "Add",
            RuleExpr::seq([RuleExpr::rule("E"), RuleExpr::literal("+"), RuleExpr::rule("N")]),
        )
        .rule("N", RuleExpr::pattern("[0-9]+"))
        .build()
        .unwrap()
}

fn assert_eager_matches_on_demand(build: fn() -> Arc<RuleSet>, goal: &str, sentences: &[&str]) {
    let eager = Parser::new(build());
    let eager = eager.build_for(goal, AutomatonKind::LookaheadOne).unwrap();
    assert!(eager.is_complete());

    let lazy_parser = Parser::new(build());
    for sentence in sentences {
        assert!(
            lazy_parser.parse_for_goal(goal, sentence).unwrap().is_success(),
            "{sentence} should parse"
        );
    }
    let rule_set = lazy_parser.rule_set();
    let goal_rule = rule_set.goal_rule_for(rule_set.find_rule(goal).unwrap()).unwrap();
    let lazy = rule_set.automaton(goal_rule, AutomatonKind::LookaheadOne);
    assert!(!lazy.is_complete());

    let eager = eager.snapshot();
    let lazy = lazy.snapshot();
    assert!(lazy.is_subset_of(&eager, false));
    assert!(eager.matches(&lazy, false), "eager:\n{eager:#?}\nlazy:\n{lazy:#?}");
}

#[test]
fn test_choice_automaton_eager_equals_on_demand() {
    assert_eager_matches_on_demand(choice_rules, "S", &["ab", "ac"]);
}

#[test]
fn test_on_demand_is_partial_before_all_sentences() {
    let eager = Parser::new(choice_rules())
        .build_for("S", AutomatonKind::LookaheadOne)
        .unwrap()
        .snapshot();
    let parser = Parser::new(choice_rules());
    assert!(parser.parse_for_goal("S", "ab").unwrap().is_success());
    let rule_set = parser.rule_set();
    let goal = rule_set.goal_rule_for(rule_set.find_rule("S").unwrap()).unwrap();
    let lazy = rule_set.automaton(goal, AutomatonKind::LookaheadOne).snapshot();
    assert!(lazy.is_subset_of(&eager, false));
    assert!(!eager.matches(&lazy, false));
}

#[test]
fn test_build_is_idempotent() {
    let parser = Parser::new(recursive_rules());
    let first = parser.build_for("E", AutomatonKind::LookaheadOne).unwrap();
    let states = first.state_count();
    let transitions = first.transition_count();
    let second = parser.build_for("E", AutomatonKind::LookaheadOne).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.state_count(), states);
    assert_eq!(second.transition_count(), transitions);
    assert_eq!(parser.rule_set().automaton_count(), 1);
}

#[test]
fn test_parsing_after_build_adds_no_states() {
    let parser = Parser::new(recursive_rules());
    let automaton = parser.build_for("E", AutomatonKind::LookaheadOne).unwrap();
    let before = automaton.snapshot();
    for sentence in ["1", "1+2", "1+2+3"] {
        assert!(parser.parse_for_goal("E", sentence).unwrap().is_success());
    }
    assert_eq!(automaton.snapshot(), before);
}

#[test]
fn test_lookahead_ignored_comparison() {
    let eager = Parser::new(recursive_rules())
        .build_for("E", AutomatonKind::LookaheadOne)
        .unwrap()
        .snapshot();
    let again = Parser::new(recursive_rules())
        .build_for("E", AutomatonKind::LookaheadOne)
        .unwrap()
        .snapshot();
    assert!(eager.matches(&again, true));
    assert!(eager.matches(&again, false));
}
