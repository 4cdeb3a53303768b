#![no_main]
use libfuzzer_sys::fuzz_target;
use thicket::automaton::AutomatonKind;
use thicket::parser::Parser;
use thicket::rule::{RuleExpr, RuleSetBuilder};

const NAMES: [&str; 4] = ["A", "B", "C", "D"];

/// Decodes one rule body from the byte stream.
fn expr(bytes: &mut impl Iterator<Item = u8>, depth: usize) -> RuleExpr {
    let Some(byte) = bytes.next() else {
        return RuleExpr::Empty;
    };
    if depth > 3 {
        return RuleExpr::literal(char::from(b'a' + byte % 3).to_string());
    }
    match byte % 8 {
        0 => RuleExpr::literal(char::from(b'a' + byte / 8 % 3).to_string()),
        1 => RuleExpr::pattern("[a-c]+"),
        2 => RuleExpr::rule(NAMES[usize::from(byte / 8) % NAMES.len()]),
        3 => RuleExpr::seq([expr(bytes, depth + 1), expr(bytes, depth + 1)]),
        4 => RuleExpr::ambiguous([expr(bytes, depth + 1), expr(bytes, depth + 1)]),
        5 => RuleExpr::optional(expr(bytes, depth + 1)),
        6 => RuleExpr::list(expr(bytes, depth + 1), usize::from(byte / 8 % 2), None),
        _ => RuleExpr::separated(expr(bytes, depth + 1), RuleExpr::literal(","), 0, Some(3)),
    }
}

fuzz_target!(|data: &[u8]| {
    let mut bytes = data.iter().copied();
    let mut builder = RuleSetBuilder::new("Fuzz");
    for name in NAMES {
        builder = builder.rule(name, expr(&mut bytes, 0));
    }
    let text: String = bytes
        .take(32)
        .map(|b| match b % 4 {
            0 => 'a',
            1 => 'b',
            2 => 'c',
            _ => ',',
        })
        .collect();

    // invalid rule sets are rejected with an error, never a panic
    let Ok(rules) = builder.build() else {
        return;
    };
    let parser = Parser::new(rules);
    let Ok(automaton) = parser.build_for("A", AutomatonKind::LookaheadOne) else {
        return;
    };
    let eager = automaton.snapshot();
    if let Ok(result) = parser.parse_for_goal("A", &text) {
        if let Some(sppt) = result.sppt {
            assert_eq!(sppt.to_text(), text);
        }
    }
    assert_eq!(automaton.snapshot(), eager);
});
