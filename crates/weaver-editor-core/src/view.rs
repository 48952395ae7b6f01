//! Editor views: a selection and a decoration layer over a model.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::model::EditorModel;
use crate::observer::{Observers, SubscriptionId};
use crate::types::{Decoration, DecorationId, Selection};

/// Callback invoked when the view's selection is set.
pub type SelectionChangeFn = dyn Fn(Option<Selection>);

/// Callback invoked after a decoration replacement.
pub type DecorationsChangeFn = dyn Fn(&DecorationsChange);

/// One atomic decoration replacement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecorationsChange {
    pub removed: Vec<DecorationId>,
    pub added: Vec<DecorationId>,
}

struct ViewInner {
    model: RefCell<Option<EditorModel>>,
    selection: Cell<Option<Selection>>,
    decorations: RefCell<BTreeMap<DecorationId, Decoration>>,
    next_decoration: Cell<u64>,
    selection_observers: Observers<SelectionChangeFn>,
    decoration_observers: Observers<DecorationsChangeFn>,
}

/// An editor widget showing a model.
///
/// The view does not track edits: after the model changes underneath it the
/// stored selection is only clamped to the new length. Keeping a cursor on
/// the same content across edits is the job of whoever applied the edit.
#[derive(Clone)]
pub struct EditorView {
    inner: Rc<ViewInner>,
}

impl fmt::Debug for EditorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorView")
            .field("selection", &self.selection())
            .field("decorations", &self.inner.decorations.borrow().len())
            .finish()
    }
}

impl EditorView {
    /// Create a view over `model` with no selection.
    pub fn new(model: &EditorModel) -> Self {
        Self {
            inner: Rc::new(ViewInner {
                model: RefCell::new(Some(model.clone())),
                selection: Cell::new(None),
                decorations: RefCell::new(BTreeMap::new()),
                next_decoration: Cell::new(0),
                selection_observers: Observers::new(),
                decoration_observers: Observers::new(),
            }),
        }
    }

    /// True if both handles point at the same view.
    pub fn ptr_eq(&self, other: &EditorView) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The model currently shown, if any.
    pub fn model(&self) -> Option<EditorModel> {
        self.inner.model.borrow().clone()
    }

    /// True if this view currently shows `model`.
    pub fn shows(&self, model: &EditorModel) -> bool {
        self.inner
            .model
            .borrow()
            .as_ref()
            .is_some_and(|current| current.ptr_eq(model))
    }

    /// Switch models. Selection and decorations are dropped.
    pub fn set_model(&self, model: Option<EditorModel>) {
        *self.inner.model.borrow_mut() = model;
        self.inner.selection.set(None);
        let removed: Vec<DecorationId> = {
            let mut decorations = self.inner.decorations.borrow_mut();
            let removed = decorations.keys().copied().collect();
            decorations.clear();
            removed
        };
        if !removed.is_empty() {
            self.notify_decorations(DecorationsChange {
                removed,
                added: Vec::new(),
            });
        }
    }

    /// Current selection, clamped to the model length.
    pub fn selection(&self) -> Option<Selection> {
        let selection = self.inner.selection.get()?;
        let len = self.model().map(|m| m.len()).unwrap_or(0);
        Some(selection.clamped(len))
    }

    /// Set the selection and notify selection observers.
    pub fn set_selection(&self, selection: Option<Selection>) {
        let len = self.model().map(|m| m.len()).unwrap_or(0);
        let selection = selection.map(|s| s.clamped(len));
        self.inner.selection.set(selection);
        for observer in self.inner.selection_observers.snapshot() {
            observer(selection);
        }
    }

    /// Subscribe to selection changes.
    pub fn on_did_change_cursor_selection(
        &self,
        callback: impl Fn(Option<Selection>) + 'static,
    ) -> SubscriptionId {
        self.inner.selection_observers.insert(Rc::new(callback))
    }

    pub fn unsubscribe_cursor_selection(&self, id: SubscriptionId) -> bool {
        self.inner.selection_observers.remove(id)
    }

    /// Replace decorations in one step.
    ///
    /// Ids in `old` that are unknown (already replaced, or dropped by
    /// `set_model`) are ignored. Returns the handles for `new`, in order.
    pub fn delta_decorations(&self, old: &[DecorationId], new: Vec<Decoration>) -> Vec<DecorationId> {
        let (removed, added) = {
            let mut decorations = self.inner.decorations.borrow_mut();
            let removed: Vec<DecorationId> = old
                .iter()
                .filter(|id| decorations.remove(*id).is_some())
                .copied()
                .collect();
            let mut added = Vec::with_capacity(new.len());
            for decoration in new {
                let id = DecorationId(self.inner.next_decoration.get());
                self.inner.next_decoration.set(id.0 + 1);
                decorations.insert(id, decoration);
                added.push(id);
            }
            (removed, added)
        };

        if !removed.is_empty() || !added.is_empty() {
            self.notify_decorations(DecorationsChange {
                removed,
                added: added.clone(),
            });
        }
        added
    }

    /// Installed decorations in handle order.
    pub fn decorations(&self) -> Vec<(DecorationId, Decoration)> {
        self.inner
            .decorations
            .borrow()
            .iter()
            .map(|(id, decoration)| (*id, decoration.clone()))
            .collect()
    }

    pub fn decoration(&self, id: DecorationId) -> Option<Decoration> {
        self.inner.decorations.borrow().get(&id).cloned()
    }

    /// Subscribe to decoration replacements.
    pub fn on_did_change_decorations(
        &self,
        callback: impl Fn(&DecorationsChange) + 'static,
    ) -> SubscriptionId {
        self.inner.decoration_observers.insert(Rc::new(callback))
    }

    pub fn unsubscribe_decorations(&self, id: SubscriptionId) -> bool {
        self.inner.decoration_observers.remove(id)
    }

    fn notify_decorations(&self, change: DecorationsChange) {
        for observer in self.inner.decoration_observers.snapshot() {
            observer(&change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarkerEdge, TextEdit};

    fn highlight(range: std::ops::Range<usize>) -> Decoration {
        Decoration {
            range,
            class: "hl".into(),
            head_class: "hl-head".into(),
            head_edge: MarkerEdge::Trailing,
            color: 0,
        }
    }

    #[test]
    fn test_selection_clamps_after_edit() {
        let model = EditorModel::new("abcdef");
        let view = EditorView::new(&model);
        view.set_selection(Some(Selection::new(2, 6)));

        model.apply_edits(&[TextEdit::delete(3..6)]).unwrap();
        assert_eq!(view.selection(), Some(Selection::new(2, 3)));
    }

    #[test]
    fn test_selection_observer() {
        let model = EditorModel::new("abc");
        let view = EditorView::new(&model);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        view.on_did_change_cursor_selection(move |sel| sink.borrow_mut().push(sel));

        view.set_selection(Some(Selection::collapsed(9)));
        view.set_selection(None);
        assert_eq!(*seen.borrow(), vec![Some(Selection::collapsed(3)), None]);
    }

    #[test]
    fn test_delta_decorations_is_single_change() {
        let model = EditorModel::new("abcdefgh");
        let view = EditorView::new(&model);
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        view.on_did_change_decorations(move |change| sink.borrow_mut().push(change.clone()));

        let first = view.delta_decorations(&[], vec![highlight(0..2), highlight(4..5)]);
        let second = view.delta_decorations(&first, vec![highlight(1..3)]);

        assert_eq!(view.decorations().len(), 1);
        assert_eq!(view.decoration(second[0]).map(|d| d.range), Some(1..3));
        assert!(view.decoration(first[0]).is_none());

        let changes = changes.borrow();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].removed, first);
        assert_eq!(changes[1].added, second);
    }

    #[test]
    fn test_set_model_drops_state() {
        let model = EditorModel::new("abc");
        let view = EditorView::new(&model);
        view.set_selection(Some(Selection::collapsed(1)));
        view.delta_decorations(&[], vec![highlight(0..1)]);

        let other = EditorModel::new("xyz");
        view.set_model(Some(other.clone()));
        assert!(view.shows(&other));
        assert!(!view.shows(&model));
        assert_eq!(view.selection(), None);
        assert!(view.decorations().is_empty());
    }
}
