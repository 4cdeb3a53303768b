#![no_main]
use libfuzzer_sys::fuzz_target;
use thicket::parser::{ParseOptions, Parser};
use thicket::rule::{RuleExpr, RuleSetBuilder};
use thicket::scanner::ScannerMode;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if text.len() > 512 {
        return;
    }

    let Ok(rules) = RuleSetBuilder::new("Fuzz")
        .rule(
            "S",
            RuleExpr::many(RuleExpr::longest([
                RuleExpr::rule("Call"),
                RuleExpr::rule("ID"),
                RuleExpr::rule("NUM"),
            ])),
        )
        .rule(
            "Call",
            RuleExpr::seq([
                RuleExpr::rule("ID"),
                RuleExpr::literal("("),
                RuleExpr::separated(RuleExpr::rule("S"), RuleExpr::literal(","), 0, None),
                RuleExpr::literal(")"),
            ]),
        )
        .rule("ID", RuleExpr::pattern("[a-z]+"))
        .rule("NUM", RuleExpr::pattern("[0-9]+"))
        .skip("WS", RuleExpr::pattern(r"\s+"))
        .build()
    else {
        return;
    };

    let parser = Parser::new(rules);
    for mode in [ScannerMode::OnDemand, ScannerMode::Classic] {
        let options = ParseOptions::default().scanner_mode(mode).report_ambiguities(true);
        let Ok(result) = parser.parse(text, &options) else {
            continue;
        };
        match result.sppt {
            Some(sppt) => {
                assert_eq!(sppt.to_text(), text);
                let _ = sppt.tokens_by_line();
            }
            None => assert!(result.issues.has_errors()),
        }
    }
    let _ = parser.expected_terminals_at(text, text.len(), &ParseOptions::default());
});
