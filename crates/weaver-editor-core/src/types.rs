//! Core editor types: selection, edits, content changes and decorations.
//!
//! These types are framework-agnostic and can be used with any text buffer implementation.

use std::ops::Range;

use smol_str::SmolStr;

/// Text selection with anchor and head positions.
///
/// The anchor is where the selection started, the head is where the cursor is now.
/// They may be in any order - use `start()` and `end()` for ordered bounds.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Where selection started
    pub anchor: usize,
    /// Where cursor is now
    pub head: usize,
}

impl Selection {
    /// Create a new selection.
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// Create a collapsed selection (cursor position).
    pub fn collapsed(offset: usize) -> Self {
        Self {
            anchor: offset,
            head: offset,
        }
    }

    /// Build a selection from ordered bounds and a direction.
    pub fn from_bounds(start: usize, end: usize, direction: SelectionDirection) -> Self {
        match direction {
            SelectionDirection::Forward => Self::new(start, end),
            SelectionDirection::Reverse => Self::new(end, start),
        }
    }

    /// Get the start (lower bound) of the selection.
    pub fn start(&self) -> usize {
        self.anchor.min(self.head)
    }

    /// Get the end (upper bound) of the selection.
    pub fn end(&self) -> usize {
        self.anchor.max(self.head)
    }

    /// Check if the selection is collapsed (empty, cursor only).
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    /// Convert to a Range<usize> (ordered).
    pub fn to_range(&self) -> Range<usize> {
        self.start()..self.end()
    }

    /// Check if the selection is backwards (head before anchor).
    pub fn is_backwards(&self) -> bool {
        self.head < self.anchor
    }

    /// Direction of the gesture that produced this selection.
    pub fn direction(&self) -> SelectionDirection {
        if self.is_backwards() {
            SelectionDirection::Reverse
        } else {
            SelectionDirection::Forward
        }
    }

    /// Clamp both ends to `len`.
    pub fn clamped(&self, len: usize) -> Self {
        Self::new(self.anchor.min(len), self.head.min(len))
    }
}

/// Which way a selection was made.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Default)]
pub enum SelectionDirection {
    /// Anchor at the start, head at the end.
    #[default]
    Forward,
    /// Head at the start, anchor at the end.
    Reverse,
}

/// Line/column position. Both zero-based, column counted in chars.
#[derive(Clone, Debug, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A single replacement: `len` chars at `offset` become `text`.
///
/// Offsets are char offsets into the text as it was before the batch
/// containing this edit was applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextEdit {
    pub offset: usize,
    pub len: usize,
    pub text: SmolStr,
}

impl TextEdit {
    /// Pure insertion at `offset`.
    pub fn insert(offset: usize, text: impl Into<SmolStr>) -> Self {
        Self {
            offset,
            len: 0,
            text: text.into(),
        }
    }

    /// Pure deletion of `range`.
    pub fn delete(range: Range<usize>) -> Self {
        Self {
            offset: range.start,
            len: range.len(),
            text: SmolStr::default(),
        }
    }

    /// Replace `range` with `text`.
    pub fn replace(range: Range<usize>, text: impl Into<SmolStr>) -> Self {
        Self {
            offset: range.start,
            len: range.len(),
            text: text.into(),
        }
    }

    /// The replaced range.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Notification emitted after a model's content changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentChange {
    /// The edits in the order the caller supplied them.
    pub changes: Vec<TextEdit>,
    /// Model version after the change.
    pub version: u64,
    /// True when the whole value was replaced via `set_value`.
    pub is_flush: bool,
}

/// Handle to an installed decoration, valid until replaced.
#[derive(Clone, Debug, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecorationId(pub u64);

/// Which edge of a decorated range carries the head marker.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum MarkerEdge {
    /// Marker drawn before the first char of the range.
    Leading,
    /// Marker drawn after the last char of the range.
    Trailing,
}

/// A highlight over `range` with a head marker on one of its edges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoration {
    /// Char offsets, ordered.
    pub range: Range<usize>,
    /// Class for the highlighted range.
    pub class: SmolStr,
    /// Class for the head marker.
    pub head_class: SmolStr,
    /// Edge the head marker sits on.
    pub head_edge: MarkerEdge,
    /// Colour (RGBA) for hosts that don't style by class.
    pub color: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_direction() {
        let forward = Selection::new(2, 5);
        assert_eq!(forward.direction(), SelectionDirection::Forward);
        assert_eq!(forward.to_range(), 2..5);

        let backward = Selection::new(5, 2);
        assert!(backward.is_backwards());
        assert_eq!(backward.direction(), SelectionDirection::Reverse);
        assert_eq!(backward.to_range(), 2..5);

        assert_eq!(
            Selection::from_bounds(2, 5, SelectionDirection::Reverse),
            backward
        );
    }

    #[test]
    fn test_selection_clamp() {
        assert_eq!(Selection::new(3, 9).clamped(4), Selection::new(3, 4));
        assert!(Selection::collapsed(7).clamped(2).is_collapsed());
    }

    #[test]
    fn test_text_edit_constructors() {
        assert_eq!(TextEdit::insert(4, "x").range(), 4..4);
        assert_eq!(TextEdit::delete(1..3).len, 2);
        let replace = TextEdit::replace(1..3, "yz");
        assert_eq!(replace.offset, 1);
        assert_eq!(replace.text, "yz");
    }
}
