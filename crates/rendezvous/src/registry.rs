use crate::error::SendError;
use rand::Rng;
use rendezvous_common::PeerId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Handle held in the registry, used to send text frames to a connection.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    /// Channel sender for delivering frames to this connection's task.
    pub tx: mpsc::Sender<String>,
    /// Identifier the peer registered under.
    pub peer_id: PeerId,
    /// Registration token; distinguishes reconnects under the same id.
    pub generation: u64,
}

impl PeerHandle {
    /// Queue a text frame for the connection without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] once the connection task has exited and
    /// [`SendError::QueueFull`] when the peer is not draining its queue.
    pub fn send(&self, frame: String) -> Result<(), SendError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

/// Registry size and a random pairing candidate, read under one lock.
#[derive(Debug)]
pub struct Snapshot {
    /// Number of registered peers.
    pub size: usize,
    /// A uniformly chosen peer other than the excluded one.
    pub candidate: Option<PeerHandle>,
}

/// Mutex-guarded peer id → connection table.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<PeerId, PeerHandle>>,
    next_generation: AtomicU64,
}

impl PeerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<PeerId, PeerHandle>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `tx` under `peer_id`, returning the new handle and the
    /// handle it replaced, if any. The replaced channel is not closed.
    #[must_use]
    pub fn register(
        &self,
        peer_id: &str,
        tx: mpsc::Sender<String>,
    ) -> (PeerHandle, Option<PeerHandle>) {
        let handle = PeerHandle {
            tx,
            peer_id: peer_id.to_string(),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
        };
        let replaced = self.peers().insert(handle.peer_id.clone(), handle.clone());
        (handle, replaced)
    }

    /// Look up a connection handle by peer id.
    #[must_use]
    pub fn lookup(&self, peer_id: &str) -> Option<PeerHandle> {
        self.peers().get(peer_id).cloned()
    }

    /// Remove the entry for `peer_id` regardless of generation.
    /// Returns `true` if an entry was removed.
    pub fn remove(&self, peer_id: &str) -> bool {
        self.peers().remove(peer_id).is_some()
    }

    /// Remove entry only if it still belongs to the given registration.
    /// Returns `true` if an entry was removed.
    pub fn remove_if(&self, peer_id: &str, generation: u64) -> bool {
        let mut peers = self.peers();
        match peers.get(peer_id) {
            Some(handle) if handle.generation == generation => {
                peers.remove(peer_id);
                true
            }
            _ => false,
        }
    }

    /// Number of registered peers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.peers().len()
    }

    /// Returns `true` if no peer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers().is_empty()
    }

    /// Pick a registered peer other than `exclude`, uniformly at random.
    #[must_use]
    pub fn select_random_excluding(&self, exclude: &str) -> Option<PeerHandle> {
        pick_excluding(&self.peers(), exclude)
    }

    /// Size and random candidate observed as one consistent state.
    #[must_use]
    pub fn admission_snapshot(&self, exclude: &str) -> Snapshot {
        let peers = self.peers();
        Snapshot {
            size: peers.len(),
            candidate: pick_excluding(&peers, exclude),
        }
    }

    /// Queue a text frame for `peer_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::UnknownPeer`] if nobody is registered under the
    /// id, otherwise as [`PeerHandle::send`].
    pub fn send_to(&self, peer_id: &str, frame: String) -> Result<(), SendError> {
        let handle = self
            .lookup(peer_id)
            .ok_or_else(|| SendError::UnknownPeer(peer_id.to_string()))?;
        handle.send(frame)
    }
}

fn pick_excluding(peers: &HashMap<PeerId, PeerHandle>, exclude: &str) -> Option<PeerHandle> {
    let eligible: Vec<&PeerHandle> = peers
        .values()
        .filter(|handle| handle.peer_id != exclude)
        .collect();
    if eligible.is_empty() {
        return None;
    }
    let index = rand::thread_rng().gen_range(0..eligible.len());
    Some(eligible[index].clone())
}
