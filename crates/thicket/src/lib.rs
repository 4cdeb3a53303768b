//! # Thicket
//!
//! A scannerless, generalized parsing engine for grammars defined at
//! runtime.
//!
//! ## Overview
//!
//! - **Rule sets**: grammars are built with [`RuleSetBuilder`] from literals,
//!   patterns, sequences, choices, optionals, lists, separated lists and
//!   references to other rule sets. No code generation is involved.
//! - **No lexer phase**: terminals are matched when a parse head expects
//!   them, so keywords and identifiers never fight over the same text.
//! - **Generalized parsing**: a graph-structured stack explores every viable
//!   derivation in one left-to-right pass. Left and right recursion both
//!   work, and nothing recurses on the call stack.
//! - **Shared packed parse forests**: ambiguous input yields one [`Sppt`]
//!   holding every derivation; priority and longest-match choices prune it.
//! - **Lazy automata**: parser states and transitions are built on demand
//!   and shared by every parse of the same rule set.
//!
//! ## Quick Start
//!
//! ```rust
//! use thicket::{ParseOptions, Parser, RuleExpr, RuleSetBuilder};
//!
//! let rules = RuleSetBuilder::new("Sums")
//!     .rule("Sum", RuleExpr::separated(RuleExpr::rule("Num"), RuleExpr::literal("+"), 1, None))
//!     .rule("Num", RuleExpr::pattern("[0-9]+"))
//!     .skip("WS", RuleExpr::pattern(r"\s+"))
//!     .build()
//!     .unwrap();
//!
//! let parser = Parser::new(rules);
//! let result = parser.parse("1 + 22 + 333", &ParseOptions::default()).unwrap();
//! let sppt = result.sppt.unwrap();
//! assert!(!sppt.is_ambiguous());
//! assert_eq!(sppt.to_text(), "1 + 22 + 333");
//!
//! let failed = parser.parse("1 +", &ParseOptions::default()).unwrap();
//! assert!(failed.sppt.is_none());
//! assert!(failed.issues.has_errors());
//! ```
//!
//! ## Features
//!
//! - `serialize`: serde support for issues, locations, tokens and forest
//!   nodes
//! - `diagnostics`: `miette::Diagnostic` for the error enums
//! - `parallel`: batch parsing on the rayon thread pool

pub mod automaton;
pub mod error;
pub mod parallel;
pub mod parser;
pub mod rule;
pub mod scanner;
pub mod sppt;

pub use automaton::{Automaton, AutomatonKind};
pub use error::{Issue, IssueHolder, ParserError, RuleSetError};
pub use parser::{ParseOptions, ParseResult, ParseStatus, Parser};
pub use rule::{ChoiceKind, RuleExpr, RuleId, RuleSet, RuleSetBuilder};
pub use scanner::ScannerMode;
pub use sppt::{Sppt, SpptNode, SpptWalker};
