use crate::admission::{self, Admission};
use crate::error::SendError;
use crate::registry::{PeerHandle, PeerRegistry};
use rendezvous_common::{Envelope, PeerId, SignalKind};
use tracing::{debug, info, warn};

/// What the relay did with one inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The frame was not a well-formed envelope.
    Malformed,
    /// `from` did not match the sending connection (strict mode only).
    SenderMismatch,
    /// Addressed to the relay itself; nothing to do.
    ForServer,
    /// Sender and receiver are the same peer.
    SelfAddressed,
    /// Delivered to the given peer.
    Forwarded(PeerId),
    /// Direct forward or offer failed; an ERROR went back to the sender.
    ForwardFailed,
    /// Answer could not be delivered; logged only.
    AnswerFailed,
    /// Broadcast without a payload.
    NoPayload,
    /// Broadcast payload is not `signaling-protocol`.
    UnknownProtocol,
    /// `signaling-protocol` payload with an unhandled sub-type.
    UnknownSignal,
    /// Lone offering peer; ACK + ROUTE/denied sent.
    Denied,
    /// No eligible receiver for an offer.
    NoReceiver,
}

impl RouteOutcome {
    /// Short label used for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::SenderMismatch => "sender_mismatch",
            Self::ForServer => "for_server",
            Self::SelfAddressed => "self_addressed",
            Self::Forwarded(_) => "forwarded",
            Self::ForwardFailed => "forward_failed",
            Self::AnswerFailed => "answer_failed",
            Self::NoPayload => "no_payload",
            Self::UnknownProtocol => "unknown_protocol",
            Self::UnknownSignal => "unknown_signal",
            Self::Denied => "denied",
            Self::NoReceiver => "no_receiver",
        }
    }
}

/// Decide where `envelope` goes and deliver it.
///
/// Runs to completion, including any ACK/ERROR/ROUTE replies. Never fails:
/// every problem ends up in the returned outcome or in a reply envelope.
pub fn route(registry: &PeerRegistry, envelope: Envelope, sender: &PeerHandle) -> RouteOutcome {
    if envelope.is_for_server() {
        debug!(via = %sender.peer_id, "message for the relay, ignoring");
        return RouteOutcome::ForServer;
    }
    if envelope.is_self_addressed() {
        debug!(via = %sender.peer_id, "self-addressed message, ignoring");
        return RouteOutcome::SelfAddressed;
    }

    if !envelope.is_broadcast() {
        return match forward(registry, &envelope) {
            Ok(receiver) => {
                debug!(from = ?envelope.from, to = %receiver, "forwarded");
                RouteOutcome::Forwarded(receiver)
            }
            Err(e) => {
                report_failure(registry, &envelope, &e);
                RouteOutcome::ForwardFailed
            }
        };
    }

    if envelope.payload.is_none() {
        debug!(via = %sender.peer_id, "discarding broadcast without payload");
        return RouteOutcome::NoPayload;
    }
    match envelope.signal() {
        Some(SignalKind::Offer) => {}
        Some(SignalKind::Answer) => return handle_answer(registry, &envelope),
        Some(kind) => {
            debug!(via = %sender.peer_id, ?kind, "discarding signal of unknown type");
            return RouteOutcome::UnknownSignal;
        }
        None => {
            debug!(via = %sender.peer_id, "discarding broadcast with unrecognised payload");
            return RouteOutcome::UnknownProtocol;
        }
    }
    handle_offer(registry, envelope)
}

/// Send `envelope` verbatim to the peer named in `to`.
fn forward(registry: &PeerRegistry, envelope: &Envelope) -> Result<PeerId, SendError> {
    let to = envelope.destination().ok_or(SendError::NoDestination)?;
    let receiver = registry
        .lookup(to)
        .ok_or_else(|| SendError::UnknownPeer(to.to_string()))?;
    receiver.send(envelope.encode())?;
    Ok(receiver.peer_id)
}

/// Tell the sender its message could not be delivered. Best effort.
fn report_failure(registry: &PeerRegistry, envelope: &Envelope, cause: &SendError) {
    info!(from = ?envelope.from, to = ?envelope.to, error = %cause, "could not forward");
    let Some(from) = envelope.sender() else {
        debug!("no sender to report forward failure to");
        return;
    };
    let reply = Envelope::forward_error(envelope.seqnr.clone(), from);
    if let Err(e) = registry.send_to(from, reply.encode()) {
        info!(peer = %from, error = %e, "could not deliver ERROR");
    }
}

fn handle_offer(registry: &PeerRegistry, mut offer: Envelope) -> RouteOutcome {
    match admission::admit_offer(registry, &offer) {
        Admission::Denied => {
            admission::deny(registry, &offer);
            RouteOutcome::Denied
        }
        Admission::Paired(receiver) => {
            debug!(from = ?offer.from, to = %receiver.peer_id, "sending offer");
            offer.set_destination(&receiver.peer_id);
            match receiver.send(offer.encode()) {
                Ok(()) => RouteOutcome::Forwarded(receiver.peer_id),
                Err(e) => {
                    report_failure(registry, &offer, &e);
                    RouteOutcome::ForwardFailed
                }
            }
        }
        Admission::NoReceiver => {
            warn!(from = ?offer.from, to = ?offer.to, "no receiver available for offer");
            RouteOutcome::NoReceiver
        }
    }
}

fn handle_answer(registry: &PeerRegistry, answer: &Envelope) -> RouteOutcome {
    match forward(registry, answer) {
        Ok(receiver) => {
            debug!(from = ?answer.from, to = %receiver, "sending answer");
            RouteOutcome::Forwarded(receiver)
        }
        Err(e) => {
            warn!(from = ?answer.from, to = ?answer.to, error = %e, "could not send answer");
            RouteOutcome::AnswerFailed
        }
    }
}
