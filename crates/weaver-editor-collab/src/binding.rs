//! Two-way binding between a shared text and a local editor model.
//!
//! Remote changes are replayed onto the model with a running index, then the
//! selections captured before the batch are restored from their relative
//! positions. Local edits go the other way inside one origin-tagged
//! transaction. Both directions run under the same `EchoGuard`, which is what
//! keeps each side from re-applying its own echo.
//!
//! A binding stays alive as long as the model, shared text and views hold its
//! callbacks, and goes away when the model is disposed (or `destroy` is
//! called).

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;
use weaver_editor_core::{
    ContentChange, DecorationId, EditorModel, EditorView, Selection, SelectionDirection,
    SubscriptionId, TextEdit,
};

use crate::CollabError;
use crate::decorations::render_decorations;
use crate::delta::{Delta, TextChange};
use crate::guard::EchoGuard;
use crate::position::{RelativePosition, RelativeSelection, capture, resolve};
use crate::presence::{PeerSelection, PresenceChannel};
use crate::text::SharedText;

/// Origin tag for transactions made by a binding, unless configured otherwise.
pub const LOCAL_ORIGIN: &str = "weaver-editor-collab";

/// Knobs for `Binding::bind_with_options`.
#[derive(Clone, Debug)]
pub struct BindingOptions {
    /// Origin attached to every transaction this binding commits.
    pub origin: SmolStr,
    /// Publish `selection: None` when a view loses its selection, so peers
    /// drop the highlight.
    pub publish_empty_selection: bool,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            origin: SmolStr::new_static(LOCAL_ORIGIN),
            publish_empty_selection: true,
        }
    }
}

struct Registrations {
    batch_start: SubscriptionId,
    text_change: SubscriptionId,
    content_change: SubscriptionId,
    dispose: SubscriptionId,
    presence_change: Option<SubscriptionId>,
    view_selection: Vec<(usize, SubscriptionId)>,
}

struct BindingInner {
    text: SharedText,
    model: EditorModel,
    views: Vec<EditorView>,
    presence: Option<PresenceChannel>,
    options: BindingOptions,
    guard: EchoGuard,
    // Both maps are keyed by index into `views`.
    saved_selections: RefCell<BTreeMap<usize, RelativeSelection>>,
    decorations: RefCell<BTreeMap<usize, Vec<DecorationId>>>,
    registrations: RefCell<Option<Registrations>>,
    destroyed: Cell<bool>,
}

/// Keeps one editor model in sync with one shared text.
#[derive(Clone)]
pub struct Binding {
    inner: Rc<BindingInner>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("peer_id", &self.inner.text.peer_id())
            .field("views", &self.inner.views.len())
            .field("presence", &self.inner.presence.is_some())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl Binding {
    /// Bind `model` to `text` with default options.
    ///
    /// The shared text wins at bind time: if the two differ, the model's
    /// content is replaced with the shared text's.
    pub fn bind(
        text: &SharedText,
        model: &EditorModel,
        views: Vec<EditorView>,
        presence: Option<PresenceChannel>,
    ) -> Result<Self, CollabError> {
        Self::bind_with_options(text, model, views, presence, BindingOptions::default())
    }

    pub fn bind_with_options(
        text: &SharedText,
        model: &EditorModel,
        views: Vec<EditorView>,
        presence: Option<PresenceChannel>,
        options: BindingOptions,
    ) -> Result<Self, CollabError> {
        let shared = text.to_string();
        if model.value() != shared {
            tracing::debug!(
                model_len = model.len(),
                text_len = text.len(),
                "replacing model content with shared text"
            );
            model.set_value(&shared)?;
        }

        if let Some(channel) = &presence {
            if channel.local_peer() != text.peer_id() {
                tracing::warn!(
                    channel_peer = channel.local_peer(),
                    text_peer = text.peer_id(),
                    "presence channel and shared text disagree on the local peer"
                );
            }
        }

        let binding = Self {
            inner: Rc::new(BindingInner {
                text: text.clone(),
                model: model.clone(),
                views,
                presence,
                options,
                guard: EchoGuard::new(),
                saved_selections: RefCell::new(BTreeMap::new()),
                decorations: RefCell::new(BTreeMap::new()),
                registrations: RefCell::new(None),
                destroyed: Cell::new(false),
            }),
        };
        binding.register();

        tracing::debug!(
            peer = text.peer_id(),
            views = binding.inner.views.len(),
            presence = binding.inner.presence.is_some(),
            "bound editor model to shared text"
        );
        binding.rerender_decorations();
        Ok(binding)
    }

    fn register(&self) {
        let inner = &self.inner;

        let this = inner.clone();
        let batch_start = inner
            .text
            .observe_before_batch(move || this.capture_selections());

        let this = inner.clone();
        let text_change = inner.text.observe(move |change| this.apply_remote(change));

        let this = inner.clone();
        let content_change = inner
            .model
            .on_did_change_content(move |change| this.apply_local(change).map_err(Into::into));

        let this = inner.clone();
        let dispose = inner.model.on_will_dispose(move || this.destroy());

        let mut presence_change = None;
        let mut view_selection = Vec::new();
        if let Some(channel) = &inner.presence {
            for (index, view) in inner.views.iter().enumerate() {
                let this = inner.clone();
                let id = view.on_did_change_cursor_selection(move |selection| {
                    this.publish_selection(index, selection)
                });
                view_selection.push((index, id));
            }
            let this = inner.clone();
            presence_change = Some(channel.on_change(move |_| this.rerender_decorations()));
        }

        *inner.registrations.borrow_mut() = Some(Registrations {
            batch_start,
            text_change,
            content_change,
            dispose,
            presence_change,
            view_selection,
        });
    }

    /// Tear the binding down: unregister every callback and clear the
    /// decorations it installed. Safe to call more than once.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Rebuild every view's remote selection decorations now.
    pub fn rerender_decorations(&self) {
        self.inner.rerender_decorations();
    }

    pub fn text(&self) -> &SharedText {
        &self.inner.text
    }

    pub fn model(&self) -> &EditorModel {
        &self.inner.model
    }

    pub fn views(&self) -> &[EditorView] {
        &self.inner.views
    }

    pub fn presence(&self) -> Option<&PresenceChannel> {
        self.inner.presence.as_ref()
    }
}

impl BindingInner {
    /// Snapshot the selection of every view showing our model, replacing the
    /// previous snapshot.
    fn capture_selections(&self) {
        self.guard.run_exclusive(|| {
            let captured: BTreeMap<usize, RelativeSelection> = self
                .views
                .iter()
                .enumerate()
                .filter(|(_, view)| view.shows(&self.model))
                .filter_map(|(index, view)| {
                    capture(view, &self.text).map(|selection| (index, selection))
                })
                .collect();
            *self.saved_selections.borrow_mut() = captured;
        });
    }

    /// Replay a shared text change onto the model.
    fn apply_remote(&self, change: &TextChange) -> Result<(), CollabError> {
        self.guard
            .run_exclusive(|| -> Result<(), CollabError> {
                tracing::trace!(
                    origin = %change.origin,
                    ops = change.deltas.len(),
                    "applying remote change"
                );
                let mut index = 0;
                for delta in &change.deltas {
                    match delta {
                        Delta::Retain(_) => {}
                        Delta::Insert(text) => {
                            self.model
                                .apply_edits(&[TextEdit::insert(index, text.clone())])?;
                        }
                        Delta::Delete(n) => {
                            self.model.apply_edits(&[TextEdit::delete(index..index + n)])?;
                        }
                    }
                    index += delta.output_len();
                }

                self.restore_selections();
                self.rerender_decorations();
                Ok(())
            })
            .unwrap_or(Ok(()))
    }

    fn restore_selections(&self) {
        let saved = self.saved_selections.borrow().clone();
        for (index, selection) in &saved {
            let Some(view) = self.views.get(*index) else {
                continue;
            };
            match resolve(selection, &self.text) {
                Some(resolved) => view.set_selection(Some(resolved)),
                None => tracing::debug!(view = index, "saved selection no longer resolves"),
            }
        }
    }

    /// Push a batch of local edits into the shared text.
    ///
    /// Edits are applied from the highest offset down so every offset still
    /// refers to text the batch has not touched yet. Overlapping edits in one
    /// batch are not supported.
    fn apply_local(&self, change: &ContentChange) -> Result<(), CollabError> {
        self.guard
            .run_exclusive(|| -> Result<(), CollabError> {
                // Reversed before the stable sort so inserts sharing an
                // offset end up in the order the model applied them.
                let mut edits: Vec<&TextEdit> = change.changes.iter().rev().collect();
                edits.sort_by(|a, b| b.offset.cmp(&a.offset));

                self.text.transact(&self.options.origin, |txn| {
                    for edit in edits {
                        txn.delete(edit.offset, edit.len)?;
                        txn.insert(edit.offset, &edit.text)?;
                    }
                    Ok(())
                })?;

                // Views don't move decorations with the text, so redraw them
                // against the new content.
                self.rerender_decorations();
                Ok(())
            })
            .unwrap_or(Ok(()))
    }

    /// Publish a view's selection to the presence channel.
    fn publish_selection(&self, index: usize, selection: Option<Selection>) {
        let Some(channel) = &self.presence else {
            return;
        };
        let Some(view) = self.views.get(index) else {
            return;
        };
        if self.destroyed.get() || !view.shows(&self.model) {
            return;
        }

        let Some(selection) = selection else {
            if self.options.publish_empty_selection {
                channel.set_local_selection(None);
            }
            return;
        };

        let (mut anchor, mut head) = (selection.start(), selection.end());
        if selection.direction() == SelectionDirection::Reverse {
            std::mem::swap(&mut anchor, &mut head);
        }
        let (Some(anchor), Some(head)) = (
            RelativePosition::from_index(&self.text, anchor),
            RelativePosition::from_index(&self.text, head),
        ) else {
            tracing::debug!(anchor, head, "selection outside shared text, not published");
            return;
        };
        channel.set_local_selection(Some(PeerSelection { anchor, head }));
    }

    fn rerender_decorations(&self) {
        let Some(channel) = &self.presence else {
            return;
        };
        if self.destroyed.get() {
            return;
        }

        let rendered = render_decorations(&channel.states(), self.text.peer_id(), &self.text);
        for (index, view) in self.views.iter().enumerate() {
            if !view.shows(&self.model) {
                continue;
            }
            let old = self
                .decorations
                .borrow()
                .get(&index)
                .cloned()
                .unwrap_or_default();
            let new = view.delta_decorations(&old, rendered.clone());
            self.decorations.borrow_mut().insert(index, new);
        }
    }

    fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }

        if let Some(registrations) = self.registrations.borrow_mut().take() {
            self.model.unsubscribe_content(registrations.content_change);
            self.text.unobserve(registrations.text_change);
            self.text.unobserve_before_batch(registrations.batch_start);
            self.model.unsubscribe_dispose(registrations.dispose);
            if let (Some(channel), Some(id)) = (&self.presence, registrations.presence_change) {
                channel.unsubscribe(id);
            }
            for (index, id) in registrations.view_selection {
                if let Some(view) = self.views.get(index) {
                    view.unsubscribe_cursor_selection(id);
                }
            }
        }

        let installed = std::mem::take(&mut *self.decorations.borrow_mut());
        for (index, ids) in installed {
            if let Some(view) = self.views.get(index) {
                view.delta_decorations(&ids, Vec::new());
            }
        }
        self.saved_selections.borrow_mut().clear();

        tracing::debug!(peer = self.text.peer_id(), "binding destroyed");
    }
}
