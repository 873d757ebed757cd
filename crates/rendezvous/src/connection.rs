use crate::assets;
use crate::error::RelayError;
use crate::lifecycle::{ConnectionClass, REJECT_REASON};
use crate::metrics::counters;
use crate::registry::PeerHandle;
use crate::server::{ConnectionGuard, ServerState};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::uri::PathAndQuery;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rendezvous_common::PeerId;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocket, Message>;
type WsRecv = SplitStream<WebSocket>;

/// Frames queued for one peer before sends start failing.
const OUTBOUND_QUEUE: usize = 256;

/// State shared by every request on the signaling listener.
#[derive(Clone)]
pub struct AppState {
    server: Arc<ServerState>,
    shutdown: watch::Receiver<()>,
}

/// Build the signaling listener's router.
///
/// Every path goes through one handler: WebSocket upgrades are classified by
/// path, plain HTTP requests get static bootstrap content.
pub fn router(server: Arc<ServerState>, shutdown: watch::Receiver<()>) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(AppState { server, shutdown })
}

/// Request path including the query string, as the client sent it.
fn request_path(uri: &Uri) -> &str {
    uri.path_and_query().map_or_else(|| uri.path(), PathAndQuery::as_str)
}

/// Response for a connection request with an unrecognised path.
fn not_found() -> Response {
    (StatusCode::NOT_FOUND, REJECT_REASON).into_response()
}

async fn handle_request(
    State(app): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: Option<WebSocketUpgrade>,
    uri: Uri,
) -> Response {
    let Some(ws) = ws else {
        return assets::serve(&app.server.config.static_dir, &uri).await;
    };

    let path = request_path(&uri).to_string();
    let class = app.server.service.classify(&path);
    if class == ConnectionClass::Rejected {
        counters::connections_total("rejected");
        info!(%peer_addr, %path, "discarding request because of malformed uri");
        return not_found();
    }

    let Some(guard) = app.server.try_acquire() else {
        warn!("max connections reached, rejecting {}", peer_addr);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let max_size = app.server.config.max_message_size;
    ws.max_message_size(max_size)
        .max_frame_size(max_size)
        .on_upgrade(move |socket| serve_socket(socket, class, peer_addr, app, guard))
}

async fn serve_socket(
    socket: WebSocket,
    class: ConnectionClass,
    peer_addr: SocketAddr,
    app: AppState,
    _guard: ConnectionGuard,
) {
    let result = match class {
        ConnectionClass::Peer(peer_id) => {
            run_peer(socket, peer_id, &app.server, app.shutdown).await
        }
        ConnectionClass::RttCollector => {
            run_rtt_collector(socket, &app.server, app.shutdown).await
        }
        ConnectionClass::Rejected => Ok(()),
    };
    if let Err(e) = result {
        debug!("connection from {} closed: {}", peer_addr, e);
    }
}

/// Register a signaling peer, relay its traffic, and unregister it on close.
async fn run_peer(
    socket: WebSocket,
    peer_id: PeerId,
    state: &ServerState,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), RelayError> {
    counters::connections_total("peer");
    info!(peer = %peer_id, "received WS request");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (deliver_tx, mut deliver_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let handle = state.service.connect(&peer_id, deliver_tx);

    let result = run_message_loop(
        &mut ws_tx,
        &mut ws_rx,
        &mut deliver_rx,
        state,
        &handle,
        &mut shutdown,
    )
    .await;

    state.service.disconnect(&handle);
    let _ = ws_tx.close().await;

    result
}

/// Drive the relay select loop for a registered peer.
async fn run_message_loop(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    deliver_rx: &mut mpsc::Receiver<String>,
    state: &ServerState,
    handle: &PeerHandle,
    shutdown: &mut watch::Receiver<()>,
) -> Result<(), RelayError> {
    let mut ping_interval = interval(Duration::from_secs(state.config.ping_interval));
    let idle_timeout = Duration::from_secs(state.config.idle_timeout);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.service.handle_frame(handle, text.as_bytes());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        state.service.handle_frame(handle, &data);
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(RelayError::WebSocket(e)),
                    // pongs are sent by the protocol layer
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                }
            }
            Some(frame) = deliver_rx.recv() => {
                last_activity = Instant::now();
                ws_tx.send(Message::Text(frame)).await?;
            }
            _ = ping_interval.tick() => {
                if last_activity.elapsed() >= idle_timeout {
                    debug!(peer = %handle.peer_id, "idle timeout reached, closing connection");
                    return Ok(());
                }
                if let Err(e) = ws_tx.send(Message::Ping(Vec::new())).await {
                    debug!("failed to send ping: {}", e);
                }
            }
            _ = shutdown.changed() => {
                debug!(peer = %handle.peer_id, "shutting down connection");
                return Ok(());
            }
        }
    }
}

/// Append every text frame of an RTT collector connection to the sink.
async fn run_rtt_collector(
    socket: WebSocket,
    state: &ServerState,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), RelayError> {
    counters::connections_total("rtt");
    info!("received WS RTT collector request");

    let (mut ws_tx, mut ws_rx) = socket.split();
    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            _ = shutdown.changed() => break,
        };
        match msg {
            Some(Ok(Message::Text(sample))) => {
                if let Err(e) = state.rtt.append(&sample).await {
                    error!("failed to append RTT sample: {}", e);
                } else {
                    counters::rtt_samples_total();
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => return Err(RelayError::WebSocket(e)),
            Some(Ok(_)) => debug!("ignoring non-text frame on RTT collector"),
        }
    }
    let _ = ws_tx.close().await;
    Ok(())
}
