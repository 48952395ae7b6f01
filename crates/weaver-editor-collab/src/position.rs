//! Content-anchored positions and selections.
//!
//! A `RelativePosition` names a point next to a specific character of the
//! shared text instead of a raw offset, so it keeps pointing at the same
//! content while other replicas insert and delete around it.

use std::fmt;

use loro::cursor::Cursor;
use weaver_editor_core::{EditorView, Selection, SelectionDirection};

use crate::CollabError;
use crate::text::SharedText;

/// A point in a shared text, anchored to content.
#[derive(Clone)]
pub struct RelativePosition {
    cursor: Cursor,
    origin_index: usize,
}

impl fmt::Debug for RelativePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelativePosition")
            .field("container", &self.cursor.container)
            .field("anchor", &self.cursor.id)
            .field("origin_index", &self.origin_index)
            .finish()
    }
}

impl RelativePosition {
    /// Anchor the point currently at `index`. None if `index` is past the end.
    pub fn from_index(text: &SharedText, index: usize) -> Option<Self> {
        text.cursor_at(index).map(|cursor| Self {
            cursor,
            origin_index: index,
        })
    }

    /// Current index in `text`.
    ///
    /// None if the position was captured in a different text or its anchor
    /// is unknown to this replica.
    pub fn resolve(&self, text: &SharedText) -> Option<usize> {
        text.cursor_index(&self.cursor)
    }

    /// Index at the time the position was captured.
    pub fn origin_index(&self) -> usize {
        self.origin_index
    }

    /// Serialize for a presence transport: the capture index as a
    /// little-endian u64, then Loro's cursor encoding.
    pub fn encode(&self) -> Vec<u8> {
        let cursor = self.cursor.encode();
        let mut out = Vec::with_capacity(8 + cursor.len());
        out.extend_from_slice(&(self.origin_index as u64).to_le_bytes());
        out.extend_from_slice(&cursor);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CollabError> {
        let (origin, cursor) = data.split_first_chunk::<8>().ok_or_else(|| {
            CollabError::InvalidPosition(format!("{} bytes is too short", data.len()))
        })?;
        let origin_index = usize::try_from(u64::from_le_bytes(*origin))
            .map_err(|e| CollabError::InvalidPosition(e.to_string()))?;
        let cursor =
            Cursor::decode(cursor).map_err(|e| CollabError::InvalidPosition(e.to_string()))?;
        Ok(Self {
            cursor,
            origin_index,
        })
    }
}

/// A selection whose ends are relative positions.
#[derive(Clone, Debug)]
pub struct RelativeSelection {
    pub start: RelativePosition,
    pub end: RelativePosition,
    pub direction: SelectionDirection,
}

impl RelativeSelection {
    /// Anchor an absolute selection. None if either end is out of range.
    pub fn from_selection(text: &SharedText, selection: Selection) -> Option<Self> {
        Some(Self {
            start: RelativePosition::from_index(text, selection.start())?,
            end: RelativePosition::from_index(text, selection.end())?,
            direction: selection.direction(),
        })
    }
}

/// Capture a view's selection as relative positions.
///
/// None when the view has no selection.
pub fn capture(view: &EditorView, text: &SharedText) -> Option<RelativeSelection> {
    let selection = view.selection()?;
    RelativeSelection::from_selection(text, selection)
}

/// Resolve a captured selection against the current text.
///
/// None unless both ends resolve in `text`. The direction is preserved and
/// the bounds are reordered if concurrent edits crossed them.
pub fn resolve(selection: &RelativeSelection, text: &SharedText) -> Option<Selection> {
    let start = selection.start.resolve(text)?;
    let end = selection.end.resolve(text)?;
    let (start, end) = if start <= end { (start, end) } else { (end, start) };
    Some(Selection::from_bounds(start, end, selection.direction))
}
