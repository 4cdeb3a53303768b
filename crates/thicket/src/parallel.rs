//! Batch parsing
//!
//! Parses many texts with one [`Parser`]. With the `parallel` feature the
//! texts are spread over the rayon thread pool; without it they are parsed
//! one after another. The rule set and its automata are shared by all
//! parses, so automaton states built for one text serve the others.

use crate::error::ParserError;
use crate::parser::{ParseOptions, ParseResult, Parser};
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Called with (completed, total) after each text of a batch.
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

impl Parser {
    /// Parses every text with the same options. Results keep the order of
    /// `texts`.
    ///
    /// An interrupt request stops only the parse that observes it.
    pub fn parse_all<S>(&self, texts: &[S], options: &ParseOptions) -> Vec<Result<ParseResult, ParserError>>
    where
        S: AsRef<str> + Sync,
    {
        self.parse_all_inner(texts, options, None)
    }

    pub fn parse_all_with_progress<S>(
        &self,
        texts: &[S],
        options: &ParseOptions,
        progress: ProgressCallback,
    ) -> Vec<Result<ParseResult, ParserError>>
    where
        S: AsRef<str> + Sync,
    {
        self.parse_all_inner(texts, options, Some(progress))
    }

    fn parse_all_inner<S>(
        &self,
        texts: &[S],
        options: &ParseOptions,
        progress: Option<ProgressCallback>,
    ) -> Vec<Result<ParseResult, ParserError>>
    where
        S: AsRef<str> + Sync,
    {
        let total = texts.len();
        let completed = AtomicUsize::new(0);
        let parse_one = |text: &S| {
            let result = self.parse(text.as_ref(), options);
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(progress) = &progress {
                progress(done, total);
            }
            result
        };
        log::debug!("parsing a batch of {total} texts");

        #[cfg(feature = "parallel")]
        let results: Vec<_> = texts.par_iter().map(parse_one).collect();
        #[cfg(not(feature = "parallel"))]
        let results: Vec<_> = texts.iter().map(parse_one).collect();
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleExpr, RuleSetBuilder};
    use std::sync::Arc;

    #[test]
    fn results_follow_input_order() {
        let rules = RuleSetBuilder::new("Batch")
            .rule("S", RuleExpr::many1(RuleExpr::literal("a")))
            .build()
            .unwrap();
        let parser = Parser::new(rules);
        let texts = ["a", "b", "aaa", ""];
        let results = parser.parse_all(&texts, &ParseOptions::default());
        let ok: Vec<bool> = results
            .iter()
            .map(|r| r.as_ref().is_ok_and(ParseResult::is_success))
            .collect();
        assert_eq!(ok, [true, false, true, false]);
    }

    #[test]
    fn progress_reaches_total() {
        let rules = RuleSetBuilder::new("Batch")
            .rule("S", RuleExpr::literal("x"))
            .build()
            .unwrap();
        let parser = Parser::new(rules);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let progress: ProgressCallback = Box::new(move |done, total| {
            assert!(done <= total);
            counter.fetch_max(done, Ordering::Relaxed);
        });
        let results = parser.parse_all_with_progress(&["x", "x", "y"], &ParseOptions::default(), progress);
        assert_eq!(results.len(), 3);
        assert_eq!(seen.load(Ordering::Relaxed), 3);
    }
}
