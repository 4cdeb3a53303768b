//! Pluggable pattern matching for pattern terminals.
//!
//! A [`PatternEngine`] compiles the source of a pattern terminal once, when
//! the rule set is built. The resulting [`PatternMatcher`] is asked for
//! anchored matches only: "does this pattern match starting exactly at
//! `position`, and where does the match end?"

use regex_automata::meta::Regex;
use regex_automata::{Anchored, Input};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The pattern source could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PatternError(pub String);

/// A compiled pattern.
pub trait PatternMatcher: Send + Sync + fmt::Debug {
    /// End offset of the match anchored at `position`, if the pattern matches
    /// there. `position` is a character boundary no greater than `text.len()`.
    fn match_at(&self, text: &str, position: usize) -> Option<usize>;
}

/// Compiles pattern sources into matchers.
pub trait PatternEngine: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`PatternError`] when `pattern` is not valid for this engine.
    fn compile(&self, pattern: &str) -> Result<Arc<dyn PatternMatcher>, PatternError>;
}

/// Default engine: `regex-automata` meta regexes, leftmost-first semantics.
///
/// Look-around assertions such as `\b` and `^` see the whole text, not just the
/// part after `position`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexPatternEngine;

impl PatternEngine for RegexPatternEngine {
    fn compile(&self, pattern: &str) -> Result<Arc<dyn PatternMatcher>, PatternError> {
        let regex = Regex::new(pattern).map_err(|err| PatternError(err.to_string()))?;
        Ok(Arc::new(RegexMatcher { regex }))
    }
}

#[derive(Debug)]
struct RegexMatcher {
    regex: Regex,
}

impl PatternMatcher for RegexMatcher {
    fn match_at(&self, text: &str, position: usize) -> Option<usize> {
        let input = Input::new(text).range(position..).anchored(Anchored::Yes);
        self.regex.find(input).map(|m| m.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_matches_anchored_at_position() {
        let matcher = RegexPatternEngine.compile("[a-z]+").unwrap();
        assert_eq!(matcher.match_at("12abc3", 2), Some(5));
        assert_eq!(matcher.match_at("12abc3", 0), None);
        assert_eq!(matcher.match_at("12abc3", 6), None);
    }

    #[test]
    fn test_regex_is_leftmost_first() {
        let matcher = RegexPatternEngine.compile("a|ab").unwrap();
        assert_eq!(matcher.match_at("ab", 0), Some(1));
    }

    #[test]
    fn test_regex_word_boundary_sees_preceding_text() {
        let matcher = RegexPatternEngine.compile(r"\bx").unwrap();
        assert_eq!(matcher.match_at("ax", 1), None);
        assert_eq!(matcher.match_at("a x", 2), Some(3));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        assert!(RegexPatternEngine.compile("(unclosed").is_err());
    }
}
