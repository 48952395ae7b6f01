//! Shared, observable text model.
//!
//! `EditorModel` is a cheap-to-clone handle. Every view showing the same text
//! holds a clone, and sync adapters subscribe to its change and disposal
//! notifications.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::error::{EditorError, ObserverError};
use crate::observer::{Observers, SubscriptionId};
use crate::text::{EditorRope, TextBuffer};
use crate::types::{ContentChange, Position, TextEdit};

/// Callback invoked after content changed.
pub type ContentChangeFn = dyn Fn(&ContentChange) -> Result<(), ObserverError>;

/// Callback invoked once when the model is disposed.
pub type DisposeFn = dyn Fn();

struct ModelInner {
    buffer: RefCell<EditorRope>,
    version: Cell<u64>,
    disposed: Cell<bool>,
    content_observers: Observers<ContentChangeFn>,
    dispose_observers: Observers<DisposeFn>,
}

/// Local text model with offset addressing and change notifications.
#[derive(Clone)]
pub struct EditorModel {
    inner: Rc<ModelInner>,
}

impl fmt::Debug for EditorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorModel")
            .field("len", &self.len())
            .field("version", &self.version())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Default for EditorModel {
    fn default() -> Self {
        Self::new("")
    }
}

impl EditorModel {
    /// Create a model holding `text`.
    pub fn new(text: &str) -> Self {
        Self {
            inner: Rc::new(ModelInner {
                buffer: RefCell::new(EditorRope::from_str(text)),
                version: Cell::new(1),
                disposed: Cell::new(false),
                content_observers: Observers::new(),
                dispose_observers: Observers::new(),
            }),
        }
    }

    /// True if both handles point at the same model.
    pub fn ptr_eq(&self, other: &EditorModel) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Full text.
    pub fn value(&self) -> String {
        self.inner.buffer.borrow().to_string()
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.inner.buffer.borrow().len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text in a char range, None if the range is invalid.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Option<SmolStr> {
        self.inner.buffer.borrow().slice(range)
    }

    /// Incremented on every content change.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Line/column of a char offset. Offsets past the end clamp to it.
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let buffer = self.inner.buffer.borrow();
        let offset = offset.min(buffer.len_chars());
        let line = buffer.char_to_line(offset);
        Position::new(line, offset - buffer.line_to_char(line))
    }

    /// Char offset of a line/column. Positions past a line's end clamp to it.
    pub fn position_to_offset(&self, position: Position) -> usize {
        let buffer = self.inner.buffer.borrow();
        if position.line >= buffer.len_lines() {
            return buffer.len_chars();
        }
        let line_start = buffer.line_to_char(position.line);
        let next_line = buffer.line_to_char(position.line + 1);
        // Keep the column on this line, before its newline if there is one.
        let line_end = if position.line + 1 < buffer.len_lines() {
            next_line.saturating_sub(1)
        } else {
            next_line
        };
        (line_start + position.column).min(line_end)
    }

    /// Replace the whole text, notifying observers with a flush change.
    pub fn set_value(&self, text: &str) -> Result<(), EditorError> {
        if self.is_disposed() {
            return Err(EditorError::Disposed);
        }
        let old_len = {
            let mut buffer = self.inner.buffer.borrow_mut();
            let old_len = buffer.len_chars();
            *buffer = EditorRope::from_str(text);
            old_len
        };
        self.emit_change(vec![TextEdit::replace(0..old_len, text)], true)
    }

    /// Apply a batch of edits atomically.
    ///
    /// Every offset refers to the text before the batch. Edits must not
    /// overlap; inserts at the same offset keep their batch order.
    pub fn apply_edits(&self, edits: &[TextEdit]) -> Result<(), EditorError> {
        if self.is_disposed() {
            return Err(EditorError::Disposed);
        }
        if edits.is_empty() {
            return Ok(());
        }

        let mut order: Vec<usize> = (0..edits.len()).collect();
        order.sort_by_key(|&i| edits[i].offset);

        {
            let mut buffer = self.inner.buffer.borrow_mut();
            let len = buffer.len_chars();
            for &i in &order {
                let edit = &edits[i];
                let end = edit.offset.checked_add(edit.len);
                if end.is_none_or(|end| end > len) {
                    return Err(EditorError::OutOfBounds {
                        start: edit.offset,
                        end: edit.offset.saturating_add(edit.len),
                        len,
                    });
                }
            }
            // Every edit now ends within the buffer, so these sums cannot
            // overflow.
            for pair in order.windows(2) {
                let (a, b) = (&edits[pair[0]], &edits[pair[1]]);
                if a.offset + a.len > b.offset {
                    return Err(EditorError::OverlappingEdits(b.offset));
                }
            }

            for &i in order.iter().rev() {
                let edit = &edits[i];
                buffer.replace(edit.range(), &edit.text);
            }
        }

        self.emit_change(edits.to_vec(), false)
    }

    fn emit_change(&self, changes: Vec<TextEdit>, is_flush: bool) -> Result<(), EditorError> {
        let version = self.inner.version.get() + 1;
        self.inner.version.set(version);
        let change = ContentChange {
            changes,
            version,
            is_flush,
        };
        for observer in self.inner.content_observers.snapshot() {
            observer(&change).map_err(EditorError::Observer)?;
        }
        Ok(())
    }

    /// Subscribe to content changes.
    pub fn on_did_change_content(
        &self,
        callback: impl Fn(&ContentChange) -> Result<(), ObserverError> + 'static,
    ) -> SubscriptionId {
        self.inner.content_observers.insert(Rc::new(callback))
    }

    pub fn unsubscribe_content(&self, id: SubscriptionId) -> bool {
        self.inner.content_observers.remove(id)
    }

    /// Subscribe to disposal. Callbacks fire once, in registration order.
    pub fn on_will_dispose(&self, callback: impl Fn() + 'static) -> SubscriptionId {
        self.inner.dispose_observers.insert(Rc::new(callback))
    }

    pub fn unsubscribe_dispose(&self, id: SubscriptionId) -> bool {
        self.inner.dispose_observers.remove(id)
    }

    /// Dispose the model. Later calls do nothing.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        tracing::debug!(version = self.version(), "disposing editor model");
        for observer in self.inner.dispose_observers.snapshot() {
            observer();
        }
        self.inner.dispose_observers.clear();
        self.inner.content_observers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_edits_uses_original_offsets() {
        let model = EditorModel::new("0123456789abc");
        model
            .apply_edits(&[TextEdit::insert(10, "Z"), TextEdit::delete(0..5)])
            .unwrap();
        assert_eq!(model.value(), "56789Zabc");
    }

    #[test]
    fn test_apply_edits_rejects_overlap() {
        let model = EditorModel::new("abcdef");
        let err = model
            .apply_edits(&[TextEdit::delete(0..3), TextEdit::replace(2..4, "x")])
            .unwrap_err();
        assert!(matches!(err, EditorError::OverlappingEdits(2)));
        assert_eq!(model.value(), "abcdef");
    }

    #[test]
    fn test_apply_edits_out_of_bounds() {
        let model = EditorModel::new("abc");
        let err = model.apply_edits(&[TextEdit::delete(2..9)]).unwrap_err();
        assert!(matches!(err, EditorError::OutOfBounds { len: 3, .. }));
    }

    #[test]
    fn test_apply_edits_huge_offset() {
        let model = EditorModel::new("abc");
        let edit = TextEdit {
            offset: usize::MAX,
            len: 2,
            text: Default::default(),
        };
        let err = model.apply_edits(&[edit, TextEdit::insert(0, "x")]).unwrap_err();
        assert!(matches!(
            err,
            EditorError::OutOfBounds {
                start: usize::MAX,
                end: usize::MAX,
                len: 3
            }
        ));
        assert_eq!(model.value(), "abc");
    }

    #[test]
    fn test_same_offset_inserts_keep_order() {
        let model = EditorModel::new("ab");
        model
            .apply_edits(&[TextEdit::insert(1, "X"), TextEdit::insert(1, "Y")])
            .unwrap();
        assert_eq!(model.value(), "aXYb");
    }

    #[test]
    fn test_change_notification() {
        let model = EditorModel::new("hello");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        model.on_did_change_content(move |change| {
            sink.borrow_mut().push(change.clone());
            Ok(())
        });

        model.apply_edits(&[TextEdit::insert(5, "!")]).unwrap();
        model.set_value("bye").unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].changes, vec![TextEdit::insert(5, "!")]);
        assert!(!seen[0].is_flush);
        assert_eq!(seen[1].changes, vec![TextEdit::replace(0..6, "bye")]);
        assert!(seen[1].is_flush);
        assert!(seen[1].version > seen[0].version);
    }

    #[test]
    fn test_observer_error_propagates() {
        let model = EditorModel::new("");
        model.on_did_change_content(|_| Err("boom".into()));
        let err = model.apply_edits(&[TextEdit::insert(0, "x")]).unwrap_err();
        assert!(matches!(err, EditorError::Observer(_)));
        // The edit itself already landed.
        assert_eq!(model.value(), "x");
    }

    #[test]
    fn test_dispose_fires_once() {
        let model = EditorModel::new("x");
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        model.on_will_dispose(move || counter.set(counter.get() + 1));

        model.dispose();
        model.dispose();
        assert_eq!(count.get(), 1);
        assert!(model.is_disposed());
        assert!(matches!(
            model.apply_edits(&[TextEdit::insert(0, "y")]),
            Err(EditorError::Disposed)
        ));
    }

    #[test]
    fn test_positions() {
        let model = EditorModel::new("ab\ncde\nf");
        assert_eq!(model.offset_to_position(0), Position::new(0, 0));
        assert_eq!(model.offset_to_position(4), Position::new(1, 1));
        assert_eq!(model.offset_to_position(99), Position::new(2, 1));
        assert_eq!(model.position_to_offset(Position::new(1, 1)), 4);
        assert_eq!(model.position_to_offset(Position::new(0, 10)), 2);
        assert_eq!(model.position_to_offset(Position::new(2, 10)), 8);
        assert_eq!(model.position_to_offset(Position::new(7, 0)), 8);
    }
}
