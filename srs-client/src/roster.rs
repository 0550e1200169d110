//! Peer roster
//!
//! Tracks the peers that matter to this client: those on our coalition (or
//! spectating) with at least one radio on a frequency we listen to. Every
//! other client the server tells us about is dropped on arrival.

use std::collections::HashMap;
use std::sync::Arc;

use log::trace;
use tokio::sync::RwLock;

use srs_common::guid::Guid;
use srs_common::protocol::ClientInfo;
use srs_common::radio::{Coalition, Radio};

/// Shared handle to the peer roster
///
/// Cloning is cheap; all clones see the same entries.
#[derive(Clone)]
pub struct Roster {
    local_guid: Guid,
    coalition: Coalition,
    radios: Arc<[Radio]>,
    peers: Arc<RwLock<HashMap<Guid, ClientInfo>>>,
}

impl Roster {
    /// Create an empty roster for the local client
    pub fn new(local_guid: Guid, coalition: Coalition, radios: Vec<Radio>) -> Self {
        Self {
            local_guid,
            coalition,
            radios: radios.into(),
            peers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Whether `peer` should be kept in the roster
    fn is_relevant(&self, peer: &ClientInfo) -> bool {
        if peer.coalition != self.coalition && !peer.coalition.is_spectator() {
            return false;
        }
        peer.radios()
            .iter()
            .any(|theirs| self.radios.iter().any(|ours| ours.hears(theirs)))
    }

    /// Insert or refresh a peer, or drop it if it no longer matches
    ///
    /// Returns `true` if the peer is in the roster afterwards. Our own
    /// identity is never stored.
    pub async fn upsert(&self, peer: ClientInfo) -> bool {
        if peer.guid == self.local_guid {
            return false;
        }

        let mut peers = self.peers.write().await;
        if self.is_relevant(&peer) {
            trace!("roster: keeping {} ({})", peer.guid, peer.name);
            peers.insert(peer.guid, peer);
            true
        } else {
            if peers.remove(&peer.guid).is_some() {
                trace!("roster: dropping {} ({}), no longer matches", peer.guid, peer.name);
            }
            false
        }
    }

    /// Remove a peer unconditionally
    pub async fn remove(&self, guid: &Guid) -> Option<ClientInfo> {
        self.peers.write().await.remove(guid)
    }

    /// Whether a peer is currently in the roster
    pub async fn contains(&self, guid: &Guid) -> bool {
        self.peers.read().await.contains_key(guid)
    }

    /// Look up a peer
    pub async fn get(&self, guid: &Guid) -> Option<ClientInfo> {
        self.peers.read().await.get(guid).cloned()
    }

    /// Number of peers in the roster
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Whether the roster is empty
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    /// Drop every peer; the next sync rebuilds the roster
    pub async fn clear(&self) {
        self.peers.write().await.clear();
    }
}
