//! Core type definitions and protocol constants for the signaling relay.

/// Self-declared identifier of a connected peer.
pub type PeerId = String;

/// Reserved `to`/`from` value naming the relay itself.
pub const SIGNALING_SERVER: &str = "signaling-server";

/// Wildcard destination: "pair me with some other connected peer".
pub const BROADCAST: &str = "*";

/// The only payload protocol the relay inspects.
pub const SIGNALING_PROTOCOL: &str = "signaling-protocol";

/// Request path prefix of a peer signaling connection (`/ws/<peer id>`).
pub const PEER_PATH_PREFIX: &str = "/ws/";

/// Request path prefix of a round-trip-time collector connection.
pub const RTT_COLLECTOR_PREFIX: &str = "/rttcollector";

/// Error text carried by ERROR envelopes when a forward fails.
pub const FORWARD_ERROR: &str = "Could not forward message";

/// Exclusive upper bound of relay-originated sequence numbers.
pub const MAX_SERVER_SEQNR: i64 = 1_000_000;

/// Outer envelope `type` values synthesized by the relay.
pub mod envelope_type {
    /// Acknowledges an offer the relay will not forward.
    pub const ACK: &str = "ACK";
    /// Reports a failed forward back to the sender.
    pub const ERROR: &str = "ERROR";
    /// Carries a relay-originated signaling message.
    pub const ROUTE: &str = "ROUTE";
}

/// Inner `payload.payload.type` discriminators of the signaling protocol.
pub mod signal_type {
    /// Connection offer.
    pub const OFFER: &str = "offer";
    /// Connection answer.
    pub const ANSWER: &str = "answer";
    /// Offer refused because no other peer is available.
    pub const DENIED: &str = "denied";
}
