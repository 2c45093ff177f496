//! Registry of live peer sockets on the hosting side.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::transport::{PeerConnection, PeerId};

/// Tracks every accepted peer socket. The sole source of truth for who
/// is currently connected; `count` backs the UI's player indicator.
///
/// A coarse lock guards the map. Broadcast iterates a point-in-time
/// snapshot of the connections, so a peer joining or leaving mid-broadcast
/// cannot corrupt the iteration or skip unaffected peers.
#[derive(Default)]
pub struct ConnectionRegistry {
    peers: Mutex<HashMap<PeerId, Arc<AsyncMutex<PeerConnection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted connection, returning its handle.
    pub fn add(&self, conn: PeerConnection) -> PeerId {
        let id = conn.id().clone();
        self.peers
            .lock()
            .insert(id.clone(), Arc::new(AsyncMutex::new(conn)));
        id
    }

    /// Drop a peer. Returns false when the peer was already gone.
    pub fn remove(&self, id: &PeerId) -> bool {
        self.peers.lock().remove(id).is_some()
    }

    pub fn count(&self) -> usize {
        self.peers.lock().len()
    }

    fn snapshot(&self) -> Vec<(PeerId, Arc<AsyncMutex<PeerConnection>>)> {
        self.peers
            .lock()
            .iter()
            .map(|(id, conn)| (id.clone(), Arc::clone(conn)))
            .collect()
    }

    /// Deliver `text` to every registered peer except `excluded`.
    ///
    /// Per-peer failures are logged and returned; they never abort
    /// delivery to the remaining peers, and the failing peer stays
    /// registered until its socket actually closes.
    pub async fn broadcast_excluding(
        &self,
        text: &str,
        excluded: Option<&PeerId>,
    ) -> Vec<(PeerId, RelayError)> {
        let mut failures = Vec::new();
        for (id, conn) in self.snapshot() {
            if Some(&id) == excluded {
                continue;
            }
            if let Err(e) = conn.lock().await.send_text(text).await {
                warn!(peer = %id, error = %e, "broadcast delivery failed");
                failures.push((id, e));
            }
        }
        failures
    }

    /// Close every peer with a normal-closure code and clear the registry.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.peers.lock().drain().map(|(_, conn)| conn).collect();
        for conn in &drained {
            conn.lock().await.close().await;
        }
        debug!(closed = drained.len(), "registry cleared");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
