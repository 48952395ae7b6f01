//! Binds a weaver editor model to a Loro CRDT text.
//!
//! This crate provides:
//! - `SharedText`: Loro-backed replicated text with ordered change events,
//!   origin-tagged transactions and a batch-start hook
//! - `RelativePosition`/`RelativeSelection`: content-anchored positions
//! - `Binding`: keeps an `EditorModel` and a `SharedText` in sync in both
//!   directions and restores selections across remote edits
//! - `PresenceChannel`: per-peer cursor/selection state, rendered as
//!   decorations on the bound views

mod binding;
mod decorations;
mod delta;
mod error;
mod guard;
mod position;
mod presence;
mod text;

pub use binding::{Binding, BindingOptions, LOCAL_ORIGIN};
pub use decorations::{head_class, peer_decoration, render_decorations, selection_class};
pub use delta::{Delta, TextChange};
pub use error::CollabError;
pub use guard::EchoGuard;
pub use position::{RelativePosition, RelativeSelection, capture, resolve};
pub use presence::{
    DEFAULT_PRESENCE_TIMEOUT, PeerSelection, PeerState, PresenceChange, PresenceChannel,
    color_for_peer,
};
pub use text::{DEFAULT_TEXT_CONTAINER, SharedText, Transaction};

// Re-export Loro types that consumers need
pub use loro::{LoroDoc, PeerID, VersionVector};
