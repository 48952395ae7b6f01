//! Storage behind an `EditorModel`.
//!
//! Everything is addressed in chars (Unicode scalar values), the same unit the
//! model's edits and the shared CRDT text use.

use smol_str::{SmolStr, ToSmolStr};
use std::ops::Range;

/// Char-addressed, line-aware text storage.
pub trait TextBuffer {
    fn len_chars(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    fn insert(&mut self, char_offset: usize, text: &str);

    fn delete(&mut self, char_range: Range<usize>);

    /// Delete `char_range`, then insert `text` at its start.
    fn replace(&mut self, char_range: Range<usize>, text: &str) {
        let start = char_range.start;
        if !char_range.is_empty() {
            self.delete(char_range);
        }
        if !text.is_empty() {
            self.insert(start, text);
        }
    }

    /// Text in `char_range`, None if the range is reversed or past the end.
    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr>;

    fn to_string(&self) -> String;

    /// Line holding `char_offset`. Offsets past the end map to the last line.
    fn char_to_line(&self, char_offset: usize) -> usize;

    /// First char of `line`. Lines past the end map to the buffer length.
    fn line_to_char(&self, line: usize) -> usize;

    /// Line count. An empty buffer, or one ending in a newline, still has a
    /// trailing empty line.
    fn len_lines(&self) -> usize;
}

/// Rope storage for the model, O(log n) edits and line lookups.
#[derive(Clone, Default)]
pub struct EditorRope {
    rope: ropey::Rope,
}

impl EditorRope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_str(s: &str) -> Self {
        Self {
            rope: ropey::Rope::from_str(s),
        }
    }
}

impl TextBuffer for EditorRope {
    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn insert(&mut self, char_offset: usize, text: &str) {
        self.rope.insert(char_offset, text);
    }

    fn delete(&mut self, char_range: Range<usize>) {
        self.rope.remove(char_range);
    }

    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr> {
        if char_range.start > char_range.end || char_range.end > self.len_chars() {
            return None;
        }
        Some(self.rope.slice(char_range).to_smolstr())
    }

    fn to_string(&self) -> String {
        self.rope.to_string()
    }

    fn char_to_line(&self, char_offset: usize) -> usize {
        self.rope.char_to_line(char_offset.min(self.rope.len_chars()))
    }

    fn line_to_char(&self, line: usize) -> usize {
        self.rope.line_to_char(line.min(self.rope.len_lines()))
    }

    fn len_lines(&self) -> usize {
        self.rope.len_lines()
    }
}
