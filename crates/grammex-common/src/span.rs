//! Source locations.
//!
//! A `Span` carries both byte offsets and 1-based line/column pairs so that
//! diagnostics and serialized trees can be read without the source text.
//! Columns count characters, not bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single point in the source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Position {
            line,
            column,
            offset,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_column: u32,
    pub start_offset: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub end_offset: u32,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Span {
            start_line: start.line,
            start_column: start.column,
            start_offset: start.offset,
            end_line: end.line,
            end_column: end.column,
            end_offset: end.offset,
        }
    }

    /// Zero-width span at `pos`.
    pub fn point(pos: Position) -> Self {
        Span::new(pos, pos)
    }

    pub fn start(&self) -> Position {
        Position::new(self.start_line, self.start_column, self.start_offset)
    }

    pub fn end(&self) -> Position {
        Position::new(self.end_line, self.end_column, self.end_offset)
    }

    pub fn set_start(&mut self, pos: Position) {
        self.start_line = pos.line;
        self.start_column = pos.column;
        self.start_offset = pos.offset;
    }

    pub fn set_end(&mut self, pos: Position) {
        self.end_line = pos.line;
        self.end_column = pos.column;
        self.end_offset = pos.offset;
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.end_offset.saturating_sub(self.start_offset)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end_offset <= self.start_offset
    }

    /// Whether `other` lies entirely inside this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.start_offset <= other.start_offset && other.end_offset <= self.end_offset
    }

    pub fn contains_offset(&self, offset: u32) -> bool {
        self.start_offset <= offset && offset < self.end_offset
    }

    /// Smallest span covering both.
    pub fn cover(&self, other: &Span) -> Span {
        let start = if other.start_offset < self.start_offset {
            other.start()
        } else {
            self.start()
        };
        let end = if other.end_offset > self.end_offset {
            other.end()
        } else {
            self.end()
        };
        Span::new(start, end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

/// Line start table for offset → line/column conversion.
#[derive(Clone, Debug, Default)]
pub struct LineMap {
    line_starts: Vec<u32>,
}

impl LineMap {
    pub fn new(text: &str) -> Self {
        let mut line_starts = Vec::with_capacity(text.len() / 32 + 1);
        line_starts.push(0);
        line_starts.extend(memchr::memchr_iter(b'\n', text.as_bytes()).map(|i| i as u32 + 1));
        LineMap { line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Position of byte `offset` in `text` (the text this map was built from).
    pub fn position(&self, text: &str, offset: u32) -> Position {
        let offset = offset.min(text.len() as u32);
        let line_idx = self.line_starts.partition_point(|&s| s <= offset) - 1;
        let line_start = self.line_starts[line_idx];
        let column = match text.get(line_start as usize..offset as usize) {
            Some(prefix) => prefix.chars().count() as u32,
            None => offset - line_start,
        };
        Position::new(line_idx as u32 + 1, column + 1, offset)
    }

    pub fn span(&self, text: &str, start: u32, end: u32) -> Span {
        Span::new(self.position(text, start), self.position(text, end))
    }
}
