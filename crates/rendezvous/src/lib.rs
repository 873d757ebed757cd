//! Rendezvous relay: WebSocket signaling broker that pairs peers for
//! direct connection setup.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Offer admission: deny lone peers, pick a receiver for broadcasts.
pub mod admission;
/// Static bootstrap content served on the signaling listener.
pub mod assets;
/// CLI argument parsing and server configuration.
pub mod config;
mod connection;
/// Error types for relay server operations.
pub mod error;
/// Connection request classification and registry bookkeeping.
pub mod lifecycle;
/// Prometheus metrics and the health endpoints.
pub mod metrics;
/// Identifier-keyed table of connected peers.
pub mod registry;
/// Envelope routing between connected peers.
pub mod router;
/// Append-only sink for RTT collector samples.
pub mod rtt;
/// Signaling listener, connection slots and shared server state.
pub mod server;
/// Facade the transport layer drives.
pub mod service;

pub use server::{run, run_with_shutdown, ServerState};
pub use service::SignalingService;
