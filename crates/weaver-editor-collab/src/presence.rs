//! Presence tracking for collaborative editing sessions.
//!
//! Holds the last published state of every known replica, keyed by peer id,
//! and tells subscribers when it changes. Getting states to and from other
//! replicas is up to the host transport.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use loro::PeerID;
use smol_str::SmolStr;
use weaver_editor_core::{Observers, SubscriptionId};
use web_time::Instant;

use crate::position::RelativePosition;
use crate::text::SharedText;

/// How long a remote state lives without a refresh before `prune_stale`
/// drops it, for callers without their own policy.
pub const DEFAULT_PRESENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Predefined collaborator colours (pastel-ish for readability).
const COLLABORATOR_COLORS: [u32; 8] = [
    0xFF6B6BFF, // Red
    0x4ECDC4FF, // Teal
    0xFFE66DFF, // Yellow
    0x95E1D3FF, // Mint
    0xF38181FF, // Coral
    0xAA96DAFF, // Purple
    0xFCBF49FF, // Orange
    0x2EC4B6FF, // Cyan
];

/// Colour (RGBA) for a peer. Same peer, same colour, on every replica.
pub fn color_for_peer(peer: PeerID) -> u32 {
    COLLABORATOR_COLORS[(peer % COLLABORATOR_COLORS.len() as u64) as usize]
}

/// A published selection. `anchor` is where the gesture started, `head`
/// where the caret is.
#[derive(Clone, Debug)]
pub struct PeerSelection {
    pub anchor: RelativePosition,
    pub head: RelativePosition,
}

/// Everything one replica publishes about itself.
#[derive(Clone, Debug, Default)]
pub struct PeerState {
    pub selection: Option<PeerSelection>,
    pub display_name: Option<SmolStr>,
}

/// Which peers changed in one update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresenceChange {
    pub added: Vec<PeerID>,
    pub updated: Vec<PeerID>,
    pub removed: Vec<PeerID>,
}

/// Callback for presence changes. Read the current states from the channel.
pub type PresenceChangeFn = dyn Fn(&PresenceChange);

struct PeerEntry {
    state: PeerState,
    updated_at: Instant,
}

struct PresenceInner {
    local_peer: PeerID,
    peers: RefCell<BTreeMap<PeerID, PeerEntry>>,
    observers: Observers<PresenceChangeFn>,
}

/// Per-peer presence state with change notifications.
#[derive(Clone)]
pub struct PresenceChannel {
    inner: Rc<PresenceInner>,
}

impl fmt::Debug for PresenceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceChannel")
            .field("local_peer", &self.inner.local_peer)
            .field("peers", &self.len())
            .finish()
    }
}

impl PresenceChannel {
    /// Create a channel whose local state belongs to `local_peer`.
    pub fn new(local_peer: PeerID) -> Self {
        let mut peers = BTreeMap::new();
        peers.insert(
            local_peer,
            PeerEntry {
                state: PeerState::default(),
                updated_at: Instant::now(),
            },
        );
        Self {
            inner: Rc::new(PresenceInner {
                local_peer,
                peers: RefCell::new(peers),
                observers: Observers::new(),
            }),
        }
    }

    /// Create a channel for the replica that owns `text`.
    pub fn for_text(text: &SharedText) -> Self {
        Self::new(text.peer_id())
    }

    pub fn local_peer(&self) -> PeerID {
        self.inner.local_peer
    }

    /// The local state, None once cleared.
    pub fn local_state(&self) -> Option<PeerState> {
        self.get(self.inner.local_peer)
    }

    /// Replace the local state. `None` marks this replica as gone.
    pub fn set_local_state(&self, state: Option<PeerState>) {
        self.set_state(self.inner.local_peer, state);
    }

    /// Set the `selection` field of the local state.
    pub fn set_local_selection(&self, selection: Option<PeerSelection>) {
        let mut state = self.local_state().unwrap_or_default();
        state.selection = selection;
        self.set_local_state(Some(state));
    }

    /// Set the `display_name` field of the local state.
    pub fn set_local_display_name(&self, name: impl Into<SmolStr>) {
        let mut state = self.local_state().unwrap_or_default();
        state.display_name = Some(name.into());
        self.set_local_state(Some(state));
    }

    /// Record a state received from another replica. `None` means it left.
    pub fn apply_remote_state(&self, peer: PeerID, state: Option<PeerState>) {
        if peer == self.inner.local_peer {
            tracing::debug!(peer, "ignoring remote state for the local peer");
            return;
        }
        self.set_state(peer, state);
    }

    /// Forget a peer.
    pub fn remove_peer(&self, peer: PeerID) {
        self.set_state(peer, None);
    }

    /// State of one peer.
    pub fn get(&self, peer: PeerID) -> Option<PeerState> {
        self.inner
            .peers
            .borrow()
            .get(&peer)
            .map(|entry| entry.state.clone())
    }

    /// All known states in ascending peer id order, local one included.
    pub fn states(&self) -> Vec<(PeerID, PeerState)> {
        self.inner
            .peers
            .borrow()
            .iter()
            .map(|(peer, entry)| (*peer, entry.state.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.peers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.peers.borrow().is_empty()
    }

    /// Drop remote peers whose state was not refreshed within `max_age`.
    pub fn prune_stale(&self, max_age: Duration) {
        let now = Instant::now();
        let removed: Vec<PeerID> = {
            let mut peers = self.inner.peers.borrow_mut();
            let stale: Vec<PeerID> = peers
                .iter()
                .filter(|(peer, entry)| {
                    **peer != self.inner.local_peer
                        && now.duration_since(entry.updated_at) > max_age
                })
                .map(|(peer, _)| *peer)
                .collect();
            for peer in &stale {
                peers.remove(peer);
            }
            stale
        };
        if !removed.is_empty() {
            tracing::debug!(?removed, "pruned stale peers");
            self.notify(PresenceChange {
                removed,
                ..Default::default()
            });
        }
    }

    /// Subscribe to presence changes.
    pub fn on_change(&self, callback: impl Fn(&PresenceChange) + 'static) -> SubscriptionId {
        self.inner.observers.insert(Rc::new(callback))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.remove(id)
    }

    fn set_state(&self, peer: PeerID, state: Option<PeerState>) {
        let change = {
            let mut peers = self.inner.peers.borrow_mut();
            match state {
                Some(state) => {
                    let entry = PeerEntry {
                        state,
                        updated_at: Instant::now(),
                    };
                    if peers.insert(peer, entry).is_some() {
                        PresenceChange {
                            updated: vec![peer],
                            ..Default::default()
                        }
                    } else {
                        PresenceChange {
                            added: vec![peer],
                            ..Default::default()
                        }
                    }
                }
                None => {
                    if peers.remove(&peer).is_none() {
                        return;
                    }
                    PresenceChange {
                        removed: vec![peer],
                        ..Default::default()
                    }
                }
            }
        };
        self.notify(change);
    }

    fn notify(&self, change: PresenceChange) {
        for observer in self.inner.observers.snapshot() {
            observer(&change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder(channel: &PresenceChannel) -> Rc<RefCell<Vec<PresenceChange>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        channel.on_change(move |change| sink.borrow_mut().push(change.clone()));
        seen
    }

    #[test]
    fn test_add_update_remove() {
        let channel = PresenceChannel::new(1);
        let seen = recorder(&channel);

        channel.apply_remote_state(7, Some(PeerState::default()));
        channel.apply_remote_state(7, Some(PeerState::default()));
        channel.remove_peer(7);
        channel.remove_peer(7);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].added, vec![7]);
        assert_eq!(seen[1].updated, vec![7]);
        assert_eq!(seen[2].removed, vec![7]);
    }

    #[test]
    fn test_local_fields() {
        let channel = PresenceChannel::new(3);
        assert!(channel.local_state().is_some());

        channel.set_local_display_name("Alice");
        channel.set_local_selection(None);
        let state = channel.local_state().unwrap();
        assert_eq!(state.display_name.as_deref(), Some("Alice"));
        assert!(state.selection.is_none());

        channel.set_local_state(None);
        assert!(channel.local_state().is_none());
    }

    #[test]
    fn test_remote_state_for_local_peer_ignored() {
        let channel = PresenceChannel::new(3);
        let seen = recorder(&channel);
        channel.apply_remote_state(3, None);
        assert!(seen.borrow().is_empty());
        assert!(channel.local_state().is_some());
    }

    #[test]
    fn test_states_sorted_by_peer() {
        let channel = PresenceChannel::new(5);
        channel.apply_remote_state(9, Some(PeerState::default()));
        channel.apply_remote_state(2, Some(PeerState::default()));
        let peers: Vec<PeerID> = channel.states().into_iter().map(|(p, _)| p).collect();
        assert_eq!(peers, vec![2, 5, 9]);
    }

    #[test]
    fn test_prune_stale_keeps_local() {
        let channel = PresenceChannel::new(1);
        channel.apply_remote_state(2, Some(PeerState::default()));
        let seen = recorder(&channel);

        std::thread::sleep(Duration::from_millis(5));
        channel.prune_stale(Duration::from_millis(1));

        assert_eq!(channel.len(), 1);
        assert!(channel.local_state().is_some());
        assert_eq!(seen.borrow()[0].removed, vec![2]);

        channel.prune_stale(DEFAULT_PRESENCE_TIMEOUT);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_color_assignment() {
        assert_eq!(color_for_peer(3), color_for_peer(3));
        assert_ne!(color_for_peer(1), color_for_peer(2));
        for peer in 0..20 {
            assert!(color_for_peer(peer) != 0);
        }
    }
}
