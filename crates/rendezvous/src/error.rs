use thiserror::Error;

/// Errors that can occur during relay server operation.
#[derive(Error, Debug)]
pub enum RelayError {
    /// WebSocket transport error on an upgraded connection.
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
    /// Listener I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a frame could not be handed to a peer's connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The envelope carries no destination.
    #[error("envelope has no destination")]
    NoDestination,
    /// No peer is registered under the identifier.
    #[error("peer {0:?} is not connected")]
    UnknownPeer(String),
    /// The peer's connection task has exited.
    #[error("channel to peer is closed")]
    Closed,
    /// The peer's outbound queue is full.
    #[error("outbound queue of peer is full")]
    QueueFull,
}
