use crate::server::ServerState;
use axum::extract::State;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// `/health` body: liveness plus current relay load.
#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    peers: usize,
    connections: usize,
}

/// `/ready` body. `reason` is set whenever the relay refuses new peers.
#[derive(Serialize)]
struct Readiness {
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

/// View of the running relay for the health endpoints.
///
/// The relay is ready while it accepts connections and has a free slot
/// below `max_conns`.
#[derive(Clone)]
pub struct HealthState {
    server: Arc<ServerState>,
    accepting: Arc<AtomicBool>,
}

impl HealthState {
    /// Watch `server`, initially accepting.
    #[must_use]
    pub fn new(server: Arc<ServerState>) -> Self {
        Self {
            server,
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Report not ready from now on; called when shutdown starts.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Relaxed);
    }

    fn report(&self) -> HealthReport {
        HealthReport {
            status: "healthy",
            peers: self.server.service.registry().size(),
            connections: self.server.active_connections.load(Ordering::Acquire),
        }
    }

    fn readiness(&self) -> Readiness {
        let reason = if !self.accepting.load(Ordering::Relaxed) {
            Some("shutting down")
        } else if self.server.active_connections.load(Ordering::Acquire)
            >= self.server.config.max_conns
        {
            Some("connection limit reached")
        } else {
            None
        };
        Readiness {
            ready: reason.is_none(),
            reason,
        }
    }
}

/// Serve `/metrics`, `/health` and `/ready` on `addr`.
///
/// # Errors
///
/// Returns an error if installing the recorder or binding the listener fails.
pub async fn start_metrics_server(addr: SocketAddr, health: HealthState) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(health);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler(State(health): State<HealthState>) -> Json<HealthReport> {
    Json(health.report())
}

async fn ready_handler(State(health): State<HealthState>) -> (StatusCode, Json<Readiness>) {
    let readiness = health.readiness();
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}

/// Registry gauges.
pub mod gauges {
    /// Record the current number of registered peers.
    #[allow(clippy::cast_precision_loss)]
    pub fn peers_registered(count: usize) {
        metrics::gauge!("rendezvous_peers_registered").set(count as f64);
    }

    /// Increment the open connections gauge.
    pub fn inc_connections_active() {
        metrics::gauge!("rendezvous_connections_active").increment(1.0);
    }

    /// Decrement the open connections gauge.
    pub fn dec_connections_active() {
        metrics::gauge!("rendezvous_connections_active").decrement(1.0);
    }
}

/// Event counters.
pub mod counters {
    /// Record a connection request with its class (`peer`, `rtt`, `rejected`).
    pub fn connections_total(class: &'static str) {
        metrics::counter!("rendezvous_connections_total", "class" => class).increment(1);
    }

    /// Record the outcome of one routed envelope.
    pub fn envelopes_total(outcome: &'static str) {
        metrics::counter!("rendezvous_envelopes_total", "outcome" => outcome).increment(1);
    }

    /// Increment the received RTT samples counter.
    pub fn rtt_samples_total() {
        metrics::counter!("rendezvous_rtt_samples_total").increment(1);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record how long one routing decision took, in seconds.
    pub fn route_latency_seconds(value: f64) {
        metrics::histogram!("rendezvous_route_latency_seconds").record(value);
    }
}
