use crate::lifecycle::{self, ConnectionClass};
use crate::metrics::{counters, histograms};
use crate::registry::{PeerHandle, PeerRegistry};
use crate::router::{self, RouteOutcome};
use rendezvous_common::Envelope;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Facade over registry, codec, router and admission policy.
///
/// The transport layer talks only to this type: it classifies connection
/// requests, registers accepted peers, hands over inbound frames, and
/// reports closed connections.
#[derive(Debug, Default)]
pub struct SignalingService {
    registry: PeerRegistry,
    strict_sender: bool,
}

impl SignalingService {
    /// Create a service with an empty registry.
    ///
    /// With `strict_sender`, envelopes whose `from` differs from the id the
    /// sending connection registered under are dropped.
    #[must_use]
    pub fn new(strict_sender: bool) -> Self {
        Self {
            registry: PeerRegistry::new(),
            strict_sender,
        }
    }

    /// The live peer registry.
    #[must_use]
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Classify an incoming connection request by its path.
    #[must_use]
    pub fn classify(&self, path: &str) -> ConnectionClass {
        lifecycle::classify(path)
    }

    /// Register an accepted peer connection.
    pub fn connect(&self, peer_id: &str, tx: mpsc::Sender<String>) -> PeerHandle {
        lifecycle::register(&self.registry, peer_id, tx)
    }

    /// Forget a closed peer connection.
    pub fn disconnect(&self, handle: &PeerHandle) {
        lifecycle::unregister(&self.registry, handle);
    }

    /// Decode and route one inbound frame from `sender`.
    pub fn handle_frame(&self, sender: &PeerHandle, raw: &[u8]) -> RouteOutcome {
        let start = Instant::now();
        let outcome = self.dispatch(sender, raw);
        counters::envelopes_total(outcome.label());
        histograms::route_latency_seconds(start.elapsed().as_secs_f64());
        outcome
    }

    fn dispatch(&self, sender: &PeerHandle, raw: &[u8]) -> RouteOutcome {
        let envelope = match Envelope::decode_bytes(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                info!(
                    peer = %sender.peer_id,
                    error = %e,
                    frame = %String::from_utf8_lossy(raw),
                    "could not parse incoming message"
                );
                return RouteOutcome::Malformed;
            }
        };

        if self.strict_sender && envelope.sender() != Some(sender.peer_id.as_str()) {
            warn!(
                peer = %sender.peer_id,
                claimed = ?envelope.from,
                "discarding message with mismatched sender"
            );
            return RouteOutcome::SenderMismatch;
        }

        router::route(&self.registry, envelope, sender)
    }
}
