//! Turns published peer selections into highlight decorations.

use loro::PeerID;
use smol_str::{SmolStr, format_smolstr};
use weaver_editor_core::{Decoration, MarkerEdge};

use crate::presence::{PeerState, color_for_peer};
use crate::text::SharedText;

/// Class for a peer's selection highlight.
pub fn selection_class(peer: PeerID) -> SmolStr {
    format_smolstr!("remote-selection remote-selection-{peer}")
}

/// Class for a peer's head marker.
pub fn head_class(peer: PeerID) -> SmolStr {
    format_smolstr!("remote-selection-head remote-selection-head-{peer}")
}

/// Decoration for one peer, or None if it has nothing resolvable to show.
pub fn peer_decoration(peer: PeerID, state: &PeerState, text: &SharedText) -> Option<Decoration> {
    let selection = state.selection.as_ref()?;
    let (Some(anchor), Some(head)) = (selection.anchor.resolve(text), selection.head.resolve(text))
    else {
        tracing::debug!(peer, "peer selection does not resolve, skipping");
        return None;
    };

    let (range, head_edge) = if anchor <= head {
        (anchor..head, MarkerEdge::Trailing)
    } else {
        (head..anchor, MarkerEdge::Leading)
    };

    Some(Decoration {
        range,
        class: selection_class(peer),
        head_class: head_class(peer),
        head_edge,
        color: color_for_peer(peer),
    })
}

/// Decorations for every peer except `local_peer`, in the order of `states`.
pub fn render_decorations(
    states: &[(PeerID, PeerState)],
    local_peer: PeerID,
    text: &SharedText,
) -> Vec<Decoration> {
    states
        .iter()
        .filter(|(peer, _)| *peer != local_peer)
        .filter_map(|(peer, state)| peer_decoration(*peer, state, text))
        .collect()
}
