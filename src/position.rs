//! Source positions for FTL text.
//!
//! Spans are byte offsets into the line-ending-normalized source. Line and
//! column lookups go through [`LineOffsetCache`], which binary-searches a
//! precomputed table of newline offsets.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(end >= start);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Precomputed newline offsets for O(log n) line/column lookup.
///
/// Positions past the end of the source clamp to the final line; callers
/// reporting errors at EOF get a stable answer instead of a panic.
#[derive(Debug, Clone)]
pub struct LineOffsetCache {
    /// Byte offset of each `\n` in the source, ascending.
    newlines: Vec<usize>,
    source_len: usize,
    /// Byte offsets of line starts, for column computation.
    line_starts: Vec<usize>,
    /// Owned copy of the source for char-accurate columns.
    source: String,
}

impl LineOffsetCache {
    pub fn new(source: &str) -> Self {
        let newlines: Vec<usize> = source
            .bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'\n')
            .map(|(i, _)| i)
            .collect();
        let mut line_starts = Vec::with_capacity(newlines.len() + 1);
        line_starts.push(0);
        line_starts.extend(newlines.iter().map(|&n| n + 1));
        Self {
            newlines,
            source_len: source.len(),
            line_starts,
            source: source.to_string(),
        }
    }

    /// 0-based line number for a byte offset.
    pub fn line(&self, pos: usize) -> usize {
        let pos = pos.min(self.source_len);
        self.newlines.partition_point(|&n| n < pos)
    }

    /// 0-based `(line, column)` for a byte offset. Columns count characters
    /// from the line start, not bytes.
    pub fn line_col(&self, pos: usize) -> (usize, usize) {
        let pos = pos.min(self.source_len);
        let line = self.line(pos);
        let line_start = self.line_starts[line];
        let col = self.source[line_start..pos].chars().count();
        (line, col)
    }

    /// Human-readable `line:col`, 1-based.
    pub fn format_position(&self, pos: usize) -> String {
        let (line, col) = self.line_col(pos);
        format!("{}:{}", line + 1, col + 1)
    }

    /// Content of the 0-based line, without its trailing newline.
    pub fn line_content(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line)?;
        let end = self
            .newlines
            .get(line)
            .copied()
            .unwrap_or(self.source_len);
        Some(&self.source[start..end])
    }
}
