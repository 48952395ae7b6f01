//! Loro-backed shared text with synchronous change dispatch.
//!
//! Loro requires `Send + Sync` subscribers, while the editor side is
//! single-threaded and `Rc`-based. The Loro subscriber therefore only queues
//! converted changes; `SharedText` drains the queue right after each commit
//! or import and hands the changes to its own observers on the calling
//! thread.

use std::borrow::Cow;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use loro::cursor::{Cursor, Side};
use loro::event::DiffEvent;
use loro::{
    ContainerID, ContainerTrait, ExportMode, LoroDoc, LoroText, PeerID, Subscription,
    VersionVector,
};
use weaver_editor_core::{Observers, SubscriptionId};

use crate::CollabError;
use crate::delta::{TextChange, text_changes};

/// Name of the text container used when none is given.
pub const DEFAULT_TEXT_CONTAINER: &str = "content";

/// Callback for text changes. Errors abort dispatch and propagate to the
/// mutation that caused the change.
pub type TextChangeFn = dyn Fn(&TextChange) -> Result<(), CollabError>;

/// Callback fired once before each batch of changes is applied.
pub type BatchStartFn = dyn Fn();

type PendingChanges = Arc<Mutex<Vec<Result<TextChange, CollabError>>>>;

struct SharedTextInner {
    doc: LoroDoc,
    text: LoroText,
    pending: PendingChanges,
    _subscription: Subscription,
    in_batch: Cell<bool>,
    observers: Observers<TextChangeFn>,
    batch_observers: Observers<BatchStartFn>,
}

/// A replicated text with change events, relative positions and
/// origin-tagged transactions.
///
/// Cloning gives another handle to the same text; several bindings may share
/// one.
#[derive(Clone)]
pub struct SharedText {
    inner: Rc<SharedTextInner>,
}

impl fmt::Debug for SharedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedText")
            .field("peer_id", &self.peer_id())
            .field("len", &self.len())
            .finish()
    }
}

impl Default for SharedText {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedText {
    /// Create a new empty text in a fresh document.
    pub fn new() -> Self {
        Self::from_doc(LoroDoc::new(), DEFAULT_TEXT_CONTAINER)
    }

    /// Create a new empty text with an explicit replica id.
    pub fn with_peer_id(peer: PeerID) -> Result<Self, CollabError> {
        let doc = LoroDoc::new();
        doc.set_peer_id(peer)?;
        Ok(Self::from_doc(doc, DEFAULT_TEXT_CONTAINER))
    }

    /// Create a text over a named container of a fresh document.
    pub fn with_container(name: &str) -> Self {
        Self::from_doc(LoroDoc::new(), name)
    }

    /// Create a text from a Loro snapshot.
    pub fn from_snapshot(snapshot: &[u8]) -> Result<Self, CollabError> {
        let doc = LoroDoc::new();
        doc.import(snapshot)
            .map_err(|e| CollabError::Import(e.to_string()))?;
        Ok(Self::from_doc(doc, DEFAULT_TEXT_CONTAINER))
    }

    /// Wrap an existing document. The container is created if missing.
    pub fn from_doc(doc: LoroDoc, container: &str) -> Self {
        let text = doc.get_text(container);
        let pending: PendingChanges = Arc::new(Mutex::new(Vec::new()));

        let target = text.id();
        let queue = pending.clone();
        let subscription = doc.subscribe(
            &text.id(),
            Arc::new(move |event: DiffEvent<'_>| {
                let changes = text_changes(&event, &target);
                if let Ok(mut queue) = queue.lock() {
                    queue.extend(changes);
                }
            }),
        );

        Self {
            inner: Rc::new(SharedTextInner {
                doc,
                text,
                pending,
                _subscription: subscription,
                in_batch: Cell::new(false),
                observers: Observers::new(),
                batch_observers: Observers::new(),
            }),
        }
    }

    /// True if both handles point at the same text.
    pub fn ptr_eq(&self, other: &SharedText) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Get the underlying Loro document.
    pub fn doc(&self) -> &LoroDoc {
        &self.inner.doc
    }

    /// Get the text container.
    pub fn loro_text(&self) -> &LoroText {
        &self.inner.text
    }

    /// Id of the text container, used to check relative positions.
    pub fn id(&self) -> ContainerID {
        self.inner.text.id()
    }

    /// This replica's id.
    pub fn peer_id(&self) -> PeerID {
        self.inner.doc.peer_id()
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.inner.text.len_unicode()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to text changes.
    pub fn observe(
        &self,
        callback: impl Fn(&TextChange) -> Result<(), CollabError> + 'static,
    ) -> SubscriptionId {
        self.inner.observers.insert(Rc::new(callback))
    }

    pub fn unobserve(&self, id: SubscriptionId) -> bool {
        self.inner.observers.remove(id)
    }

    /// Subscribe to the start of every change batch, local or imported.
    ///
    /// Fires before any content of the batch is applied, once per batch,
    /// whatever part of the document the batch touches.
    pub fn observe_before_batch(&self, callback: impl Fn() + 'static) -> SubscriptionId {
        self.inner.batch_observers.insert(Rc::new(callback))
    }

    pub fn unobserve_before_batch(&self, id: SubscriptionId) -> bool {
        self.inner.batch_observers.remove(id)
    }

    /// Run `f` as one atomic, origin-tagged transaction.
    ///
    /// Observers see the result as a single change once `f` returns. A
    /// transaction opened from inside another one (for example by an
    /// observer) joins the outer batch instead of committing on its own.
    pub fn transact<R>(
        &self,
        origin: &str,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<R, CollabError>,
    ) -> Result<R, CollabError> {
        if self.inner.in_batch.get() {
            return f(&mut Transaction { text: &self.inner.text });
        }

        self.begin_batch();
        let result = f(&mut Transaction { text: &self.inner.text });
        self.inner.doc.set_next_commit_origin(origin);
        self.inner.doc.commit();
        self.inner.in_batch.set(false);

        // Whatever `f` managed to apply is committed, so observers hear about
        // it even when `f` failed halfway.
        let dispatched = self.dispatch_pending();
        let value = result?;
        dispatched?;
        Ok(value)
    }

    /// Insert text in its own transaction.
    pub fn insert(&self, origin: &str, index: usize, text: &str) -> Result<(), CollabError> {
        self.transact(origin, |txn| txn.insert(index, text))
    }

    /// Delete chars in their own transaction.
    pub fn delete(&self, origin: &str, index: usize, len: usize) -> Result<(), CollabError> {
        self.transact(origin, |txn| txn.delete(index, len))
    }

    /// Import remote updates or a snapshot, dispatching the resulting change.
    pub fn import(&self, data: &[u8]) -> Result<(), CollabError> {
        self.begin_batch();
        let imported = self.inner.doc.import(data);
        self.inner.in_batch.set(false);
        imported.map_err(|e| CollabError::Import(e.to_string()))?;
        self.dispatch_pending()
    }

    /// Export full snapshot.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, CollabError> {
        self.inner
            .doc
            .export(ExportMode::Snapshot)
            .map_err(|e| CollabError::Export(e.to_string()))
    }

    /// Export updates since given version. None when there is nothing new.
    pub fn export_updates_since(
        &self,
        version: &VersionVector,
    ) -> Result<Option<Vec<u8>>, CollabError> {
        if *version == self.inner.doc.oplog_vv() {
            return Ok(None);
        }

        let updates = self
            .inner
            .doc
            .export(ExportMode::Updates {
                from: Cow::Owned(version.clone()),
            })
            .map_err(|e| CollabError::Export(e.to_string()))?;

        if updates.is_empty() {
            return Ok(None);
        }
        Ok(Some(updates))
    }

    /// Get current version vector.
    pub fn version(&self) -> VersionVector {
        self.inner.doc.oplog_vv()
    }

    /// Content-anchored cursor for `index`. None if the index is past the end.
    pub(crate) fn cursor_at(&self, index: usize) -> Option<Cursor> {
        if index > self.len() {
            return None;
        }
        self.inner.text.get_cursor(index, Side::default())
    }

    /// Current index of a cursor in this text.
    ///
    /// None if the cursor belongs to another container or Loro cannot place
    /// it in the current history.
    pub(crate) fn cursor_index(&self, cursor: &Cursor) -> Option<usize> {
        if cursor.container != self.id() {
            return None;
        }
        let result = self.inner.doc.get_cursor_pos(cursor).ok()?;
        Some(result.current.pos.min(self.len()))
    }

    fn begin_batch(&self) {
        // Flush anything the document auto-committed outside our control so
        // it is not attributed to the coming batch.
        self.inner.doc.commit();
        if let Err(e) = self.dispatch_pending() {
            tracing::warn!("dropping change committed outside a batch: {e}");
        }
        for observer in self.inner.batch_observers.snapshot() {
            observer();
        }
        self.inner.in_batch.set(true);
    }

    fn dispatch_pending(&self) -> Result<(), CollabError> {
        let changes = match self.inner.pending.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for change in changes {
            let change = change?;
            tracing::trace!(origin = %change.origin, ops = change.deltas.len(), "text change");
            for observer in self.inner.observers.snapshot() {
                observer(&change)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for SharedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.text.to_string())
    }
}

/// Mutation access inside `SharedText::transact`.
pub struct Transaction<'a> {
    text: &'a LoroText,
}

impl Transaction<'_> {
    /// Insert `text` at char `index`.
    pub fn insert(&mut self, index: usize, text: &str) -> Result<(), CollabError> {
        if text.is_empty() {
            return Ok(());
        }
        self.text.insert(index, text)?;
        Ok(())
    }

    /// Delete `len` chars at `index`.
    pub fn delete(&mut self, index: usize, len: usize) -> Result<(), CollabError> {
        if len == 0 {
            return Ok(());
        }
        self.text.delete(index, len)?;
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::apply_to_string;
    use std::cell::RefCell;

    fn record(text: &SharedText) -> Rc<RefCell<Vec<TextChange>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        text.observe(move |change| {
            sink.borrow_mut().push(change.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn test_transaction_emits_one_change() {
        let text = SharedText::new();
        let seen = record(&text);

        text.transact("local", |txn| {
            txn.insert(0, "world")?;
            txn.insert(0, "hello ")
        })
        .unwrap();

        assert_eq!(text.to_string(), "hello world");
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].origin, "local");
        assert_eq!(apply_to_string("", &seen[0].deltas).unwrap(), "hello world");
    }

    #[test]
    fn test_batch_start_fires_before_content() {
        let text = SharedText::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let batch_log = log.clone();
        let reader = text.clone();
        text.observe_before_batch(move || batch_log.borrow_mut().push(format!("start:{reader}")));
        let change_log = log.clone();
        text.observe(move |_| {
            change_log.borrow_mut().push("change".to_string());
            Ok(())
        });

        text.insert("local", 0, "ab").unwrap();
        text.insert("local", 2, "c").unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["start:", "change", "start:ab", "change"]
        );
    }

    #[test]
    fn test_import_dispatches_remote_change() {
        let a = SharedText::with_peer_id(1).unwrap();
        let b = SharedText::with_peer_id(2).unwrap();
        a.insert("local", 0, "shared").unwrap();

        let seen = record(&b);
        let since = b.version();
        b.import(&a.export_updates_since(&since).unwrap().unwrap())
            .unwrap();

        assert_eq!(b.to_string(), "shared");
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(apply_to_string("", &seen[0].deltas).unwrap(), "shared");
    }

    #[test]
    fn test_export_updates_none_when_current() {
        let text = SharedText::new();
        text.insert("local", 0, "x").unwrap();
        assert!(text.export_updates_since(&text.version()).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let text = SharedText::new();
        text.insert("local", 0, "Test content").unwrap();

        let restored = SharedText::from_snapshot(&text.export_snapshot().unwrap()).unwrap();
        assert_eq!(restored.to_string(), "Test content");
    }

    #[test]
    fn test_observer_error_propagates() {
        let text = SharedText::new();
        text.observe(|_| Err(CollabError::UnexpectedDelta("test".into())));
        let err = text.insert("local", 0, "x").unwrap_err();
        assert!(matches!(err, CollabError::UnexpectedDelta(_)));
    }

    #[test]
    fn test_cursor_follows_content() {
        let a = SharedText::with_peer_id(1).unwrap();
        a.insert("local", 0, "abcdef").unwrap();
        let cursor = a.cursor_at(3).unwrap();

        a.insert("local", 0, "XYZ").unwrap();
        assert_eq!(a.cursor_index(&cursor), Some(6));

        let other = SharedText::with_container("other");
        assert_eq!(other.cursor_index(&cursor), None);
    }

    #[test]
    fn test_id_names_text_container() {
        let text = SharedText::new();
        assert_eq!(
            text.id(),
            ContainerID::new_root(DEFAULT_TEXT_CONTAINER, loro::ContainerType::Text)
        );
        assert_eq!(text.id(), text.loro_text().id());
        assert_ne!(SharedText::with_container("notes").id(), text.id());
    }
}
