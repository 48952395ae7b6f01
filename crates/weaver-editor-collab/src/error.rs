//! Error types for collab binding operations.

use thiserror::Error;
use weaver_editor_core::EditorError;

/// Errors that can occur while syncing an editor with a shared text.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CollabError {
    /// A text change carried an operation that is not retain/insert/delete.
    ///
    /// This means the translator and the CRDT disagree about the change
    /// format, so it is never skipped.
    #[error("unexpected text delta: {0}")]
    UnexpectedDelta(String),

    /// Failed to import CRDT data.
    #[error("failed to import CRDT data: {0}")]
    Import(String),

    /// Failed to export CRDT data.
    #[error("failed to export CRDT data: {0}")]
    Export(String),

    /// Relative position bytes could not be decoded.
    #[error("invalid relative position: {0}")]
    InvalidPosition(String),

    /// Loro CRDT error.
    #[error("loro error: {0}")]
    Loro(String),

    /// Applying a change to the editor model failed.
    #[error(transparent)]
    Editor(#[from] EditorError),
}

impl From<loro::LoroError> for CollabError {
    fn from(e: loro::LoroError) -> Self {
        CollabError::Loro(e.to_string())
    }
}
