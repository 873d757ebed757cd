use crate::metrics::gauges;
use crate::registry::{PeerHandle, PeerRegistry};
use rendezvous_common::types::{
    BROADCAST, PEER_PATH_PREFIX, RTT_COLLECTOR_PREFIX, SIGNALING_SERVER,
};
use rendezvous_common::PeerId;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reason sent with the 404 for unrecognised connection requests.
pub const REJECT_REASON: &str = "malformed request";

/// What a connection request asks for, derived from its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionClass {
    /// `/ws/<peer id>`: a signaling peer.
    Peer(PeerId),
    /// `/rttcollector...`: a telemetry stream for the RTT sink.
    RttCollector,
    /// Anything else, including `/ws/` with an empty or reserved id.
    Rejected,
}

/// Classify a request path (including any query string).
///
/// The peer id is everything after `/ws/`, taken verbatim. The reserved
/// destinations `*` and `signaling-server` cannot be registered.
#[must_use]
pub fn classify(path: &str) -> ConnectionClass {
    if path.starts_with(RTT_COLLECTOR_PREFIX) {
        return ConnectionClass::RttCollector;
    }
    match path.strip_prefix(PEER_PATH_PREFIX) {
        Some(peer_id) if !is_reserved(peer_id) => ConnectionClass::Peer(peer_id.to_string()),
        _ => ConnectionClass::Rejected,
    }
}

fn is_reserved(peer_id: &str) -> bool {
    peer_id.is_empty() || peer_id == BROADCAST || peer_id == SIGNALING_SERVER
}

/// Register an accepted peer connection.
pub fn register(registry: &PeerRegistry, peer_id: &str, tx: mpsc::Sender<String>) -> PeerHandle {
    let (handle, replaced) = registry.register(peer_id, tx);
    if let Some(old) = replaced {
        warn!(
            peer = %peer_id,
            old_generation = old.generation,
            "peer id reused, replacing earlier connection"
        );
    }
    info!(peer = %peer_id, generation = handle.generation, "peer registered");
    gauges::peers_registered(registry.size());
    handle
}

/// Drop a closed connection from the registry.
///
/// A close for a registration that was already superseded leaves the newer
/// registration in place.
pub fn unregister(registry: &PeerRegistry, handle: &PeerHandle) {
    if registry.remove_if(&handle.peer_id, handle.generation) {
        info!(peer = %handle.peer_id, "removing peer");
    } else {
        debug!(
            peer = %handle.peer_id,
            generation = handle.generation,
            "close for superseded connection, registry unchanged"
        );
    }
    gauges::peers_registered(registry.size());
}
