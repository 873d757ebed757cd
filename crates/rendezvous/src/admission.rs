use crate::registry::{PeerHandle, PeerRegistry};
use rand::Rng;
use rendezvous_common::types::MAX_SERVER_SEQNR;
use rendezvous_common::Envelope;
use tracing::{debug, info};

/// Decision for a broadcast offer.
#[derive(Debug)]
pub enum Admission {
    /// The offering peer is alone; answer with ACK + ROUTE/denied.
    Denied,
    /// Forward the offer to this peer.
    Paired(PeerHandle),
    /// Several peers are registered but none is eligible.
    NoReceiver,
}

/// Decide where a broadcast offer goes.
///
/// The registry size and the random candidate come from one snapshot, so a
/// concurrent disconnect cannot slip between the two.
#[must_use]
pub fn admit_offer(registry: &PeerRegistry, offer: &Envelope) -> Admission {
    let from = offer.sender().unwrap_or_default();
    let snapshot = registry.admission_snapshot(from);

    if snapshot.size <= 1 {
        return Admission::Denied;
    }

    if let Some(receiver) = offer.destination().and_then(|to| registry.lookup(to)) {
        return Admission::Paired(receiver);
    }

    if offer.is_broadcast() {
        if let Some(receiver) = snapshot.candidate {
            return Admission::Paired(receiver);
        }
    }
    Admission::NoReceiver
}

/// Send the denial pair (ACK, then ROUTE/denied) back to the offering peer.
///
/// Delivery is best effort; failures are logged and dropped.
pub fn deny(registry: &PeerRegistry, offer: &Envelope) {
    let from = offer.sender().unwrap_or_default();
    debug!(peer = %from, "denying offer, no other peer registered");

    let ack = Envelope::ack(offer.seqnr.clone(), from);
    if let Err(e) = registry.send_to(from, ack.encode()) {
        info!(peer = %from, error = %e, "could not ACK offer");
    }

    let seqnr = rand::thread_rng().gen_range(0..MAX_SERVER_SEQNR);
    let denied = Envelope::denied(from, seqnr, offer.nested_seqnr());
    if let Err(e) = registry.send_to(from, denied.encode()) {
        info!(peer = %from, error = %e, "could not deliver denial");
    }
}
