//! Byte offset to line/column conversion
//!
//! Issues and tokens report 1-based lines and columns. Columns are counted in
//! UTF-8 bytes from the start of the line, so they agree with the byte offsets
//! used everywhere else in the crate.

use memchr::memchr2_iter;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A location in the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct InputLocation {
    /// Byte offset from the start of the text
    pub position: usize,
    /// 1-based line number
    pub line: usize,
    /// 1-based column, in bytes
    pub column: usize,
    /// Length in bytes of the located region
    pub length: usize,
}

impl InputLocation {
    #[must_use]
    pub const fn new(position: usize, line: usize, column: usize, length: usize) -> Self {
        Self {
            position,
            line,
            column,
            length,
        }
    }
}

impl std::fmt::Display for InputLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Line start index for a text.
///
/// Built once per text, then every conversion is a binary search over the
/// line starts. `\n`, `\r\n` and a lone `\r` all end a line.
///
/// ```rust
/// use thicket::error::LineIndex;
///
/// let index = LineIndex::new("line 1\nline 2");
/// let location = index.location(10, 1);
/// assert_eq!((location.line, location.column), (2, 4));
/// ```
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    text_len: usize,
}

impl LineIndex {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut line_starts = vec![0];
        for i in memchr2_iter(b'\n', b'\r', bytes) {
            if bytes[i] == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
                continue;
            }
            line_starts.push(i + 1);
        }
        Self {
            line_starts,
            text_len: text.len(),
        }
    }

    /// Zero-based line containing `offset`. Offsets past the end of the text
    /// are clamped to the last line.
    #[must_use]
    pub fn line_of(&self, offset: usize) -> usize {
        let offset = offset.min(self.text_len);
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        }
    }

    /// 1-based location of `offset` covering `length` bytes.
    #[must_use]
    pub fn location(&self, offset: usize, length: usize) -> InputLocation {
        let line = self.line_of(offset);
        let column = offset.min(self.text_len) - self.line_starts[line];
        InputLocation::new(offset, line + 1, column + 1, length)
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset where zero-based `line` starts.
    #[must_use]
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }
}

/// Excerpt of `text` around `position` with a `^` marking the position.
///
/// At most ten characters are taken on each side, and an ellipsis marks
/// truncated sides.
#[must_use]
pub fn context_excerpt(text: &str, position: usize) -> String {
    const SPAN: usize = 10;
    let position = floor_char_boundary(text, position.min(text.len()));
    let before = &text[..position];
    let after = &text[position..];

    let before_start = before
        .char_indices()
        .rev()
        .nth(SPAN - 1)
        .map_or(0, |(i, _)| i);
    let after_end = after.char_indices().nth(SPAN).map_or(after.len(), |(i, _)| i);

    let mut excerpt = String::with_capacity(2 * SPAN + 8);
    if before_start > 0 {
        excerpt.push_str("...");
    }
    excerpt.push_str(&before[before_start..]);
    excerpt.push('^');
    excerpt.push_str(&after[..after_end]);
    if after_end < after.len() {
        excerpt.push_str("...");
    }
    excerpt
}

pub(crate) fn floor_char_boundary(text: &str, mut position: usize) -> usize {
    while position > 0 && !text.is_char_boundary(position) {
        position -= 1;
    }
    position
}
