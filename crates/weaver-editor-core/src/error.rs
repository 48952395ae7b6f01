//! Error types for editor model operations.

use thiserror::Error;

/// Boxed error returned by a content-change observer.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while editing a model.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EditorError {
    /// An edit addressed text past the end of the buffer.
    #[error("edit range {start}..{end} out of bounds for length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },

    /// Two edits in one batch touch the same text.
    #[error("overlapping edits at offset {0}")]
    OverlappingEdits(usize),

    /// The model was already disposed.
    #[error("model is disposed")]
    Disposed,

    /// A content-change observer failed.
    #[error("content change observer failed: {0}")]
    Observer(#[source] ObserverError),
}
