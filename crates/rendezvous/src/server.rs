use crate::config::ServerConfig;
use crate::connection;
use crate::error::RelayError;
use crate::metrics::gauges;
use crate::rtt::RttSink;
use crate::service::SignalingService;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};
use tracing::{info, warn};

/// How long in-flight connections get to finish after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for the relay server.
pub struct ServerState {
    /// Signaling core: registry, routing and admission.
    pub service: SignalingService,
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// Destination for RTT collector samples.
    pub rtt: RttSink,
    /// Open WebSocket connections of any class.
    pub active_connections: AtomicUsize,
    idle: Notify,
}

impl ServerState {
    /// Build server state around an opened RTT sink.
    #[must_use]
    pub fn new(config: ServerConfig, rtt: RttSink) -> Self {
        Self {
            service: SignalingService::new(config.strict_sender),
            config,
            rtt,
            active_connections: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    /// Claim a connection slot, or `None` when `max_conns` are already open.
    pub(crate) fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        let max = self.config.max_conns;
        self.active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()?;
        gauges::inc_connections_active();
        Some(ConnectionGuard {
            state: Arc::clone(self),
        })
    }

    /// Resolves once no connection slot is held.
    async fn drained(&self) {
        loop {
            let notified = self.idle.notified();
            if self.active_connections.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Holds one slot of `active_connections` for the lifetime of a connection.
pub(crate) struct ConnectionGuard {
    state: Arc<ServerState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        gauges::dec_connections_active();
        if self.state.active_connections.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.idle.notify_waiters();
        }
    }
}

/// # Errors
///
/// Returns an error if the listener fails.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), RelayError> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    run_with_shutdown(listener, state, shutdown_rx).await
}

/// Serve signaling upgrades and static content on `listener` until shutdown.
///
/// A send on the channel behind `shutdown_rx` (or dropping its sender) stops
/// accepting, asks every open connection to close, and waits up to
/// [`DRAIN_TIMEOUT`] for them.
///
/// # Errors
///
/// Returns an error if the listener fails.
pub async fn run_with_shutdown(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), RelayError> {
    let local_addr = listener.local_addr()?;
    info!("server listening on {}", local_addr);

    let app = connection::router(Arc::clone(&state), shutdown_rx.clone());
    let mut signal = shutdown_rx;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = signal.changed().await;
    })
    .await?;

    info!(
        "shutdown signal received, draining {} connections",
        state.active_connections.load(Ordering::Acquire)
    );
    if tokio::time::timeout(DRAIN_TIMEOUT, state.drained()).await.is_err() {
        warn!(
            "drain timeout reached with {} connections still active",
            state.active_connections.load(Ordering::Acquire)
        );
    }

    info!("server shut down gracefully");
    Ok(())
}

/// Server state over a scratch RTT file, for unit tests.
#[cfg(test)]
pub(crate) async fn test_state(max_conns: usize) -> (Arc<ServerState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        static_dir: dir.path().join("static"),
        rtt_file: dir.path().join("rtt.dat"),
        max_conns,
        max_message_size: 65_536,
        ping_interval: 30,
        idle_timeout: 120,
        strict_sender: false,
    };
    let rtt = RttSink::open(&config.rtt_file).await.unwrap();
    (Arc::new(ServerState::new(config, rtt)), dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slots_are_capped_and_released() {
        let (state, _dir) = test_state(2).await;
        let first = state.try_acquire().unwrap();
        let second = state.try_acquire().unwrap();
        assert!(state.try_acquire().is_none());
        assert_eq!(state.active_connections.load(Ordering::Acquire), 2);

        drop(first);
        let third = state.try_acquire().unwrap();
        drop(second);
        drop(third);
        assert_eq!(state.active_connections.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn drained_waits_for_last_slot() {
        let (state, _dir) = test_state(4).await;
        let guard = state.try_acquire().unwrap();

        let waiter = tokio::spawn({
            let state = Arc::clone(&state);
            async move { state.drained().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
