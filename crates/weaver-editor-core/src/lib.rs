//! weaver-editor-core: Pure Rust editor logic without framework dependencies.
//!
//! This crate provides:
//! - `TextBuffer` trait for text storage abstraction
//! - `EditorRope` - ropey-backed implementation
//! - `EditorModel` - shared text model with change and disposal notifications
//! - `EditorView` - selection and decoration layer over a model
//! - `Observers` - the callback registry behind all of the above

pub mod error;
pub mod model;
pub mod observer;
pub mod text;
pub mod types;
pub mod view;

pub use error::{EditorError, ObserverError};
pub use model::{ContentChangeFn, DisposeFn, EditorModel};
pub use observer::{Observers, SubscriptionId};
pub use smol_str::SmolStr;
pub use text::{EditorRope, TextBuffer};
pub use types::{
    ContentChange, Decoration, DecorationId, MarkerEdge, Position, Selection, SelectionDirection,
    TextEdit,
};
pub use view::{DecorationsChange, DecorationsChangeFn, EditorView, SelectionChangeFn};
