#![allow(dead_code)]

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rendezvous::config::ServerConfig;
use rendezvous::rtt::RttSink;
use rendezvous::server::ServerState;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Config with static content and the RTT file below `dir`.
pub fn test_config(listen: SocketAddr, dir: &Path) -> ServerConfig {
    let static_dir = dir.join("static");
    std::fs::create_dir_all(&static_dir).unwrap();
    ServerConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        static_dir,
        rtt_file: dir.join("rtt.dat"),
        max_conns: 1000,
        max_message_size: 65_536,
        ping_interval: 30,
        idle_timeout: 120,
        strict_sender: false,
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    pub dir: TempDir,
}

impl TestServer {
    pub fn rtt_path(&self) -> PathBuf {
        self.dir.path().join("rtt.dat")
    }

    pub fn static_dir(&self) -> PathBuf {
        self.dir.path().join("static")
    }

    /// Wait until `peer_id` shows up in the registry.
    pub async fn wait_registered(&self, peer_id: &str) {
        self.wait_until(|state| state.service.registry().lookup(peer_id).is_some())
            .await;
    }

    /// Wait until the registry holds exactly `count` peers.
    pub async fn wait_size(&self, count: usize) {
        self.wait_until(|state| state.service.registry().size() == count)
            .await;
    }

    async fn wait_until(&self, check: impl Fn(&ServerState) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !check(&self.state) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timeout waiting for registry state"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

pub async fn start_server_with(tweak: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr, dir.path());
    tweak(&mut config);

    let rtt = RttSink::open(&config.rtt_file).await.unwrap();
    let state = Arc::new(ServerState::new(config, rtt));

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = rendezvous::run(listener, state_clone).await {
            eprintln!("server error in test: {e}");
        }
    });

    TestServer { addr, state, dir }
}

pub struct TestPeer {
    pub id: String,
    pub ws_tx: SplitSink<ClientStream, Message>,
    pub ws_rx: SplitStream<ClientStream>,
}

impl TestPeer {
    /// Connect as `id` and wait until the relay has registered it.
    pub async fn join(server: &TestServer, id: &str) -> Self {
        let ws = connect_path(&server.addr, &format!("/ws/{id}")).await.unwrap();
        server.wait_registered(id).await;
        let (ws_tx, ws_rx) = ws.split();
        Self {
            id: id.to_string(),
            ws_tx,
            ws_rx,
        }
    }

    pub async fn send_json(&mut self, value: &Value) {
        self.send_text(&value.to_string()).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws_tx
            .send(Message::Text(text.to_string()))
            .await
            .unwrap();
    }

    pub async fn recv_json(&mut self) -> Value {
        self.recv_json_timeout(Duration::from_secs(5))
            .await
            .expect("timeout waiting for envelope")
    }

    pub async fn recv_json_timeout(&mut self, timeout: Duration) -> Option<Value> {
        tokio::time::timeout(timeout, async {
            loop {
                let msg = self.ws_rx.next().await?.ok()?;
                match msg {
                    Message::Text(text) => return serde_json::from_str(&text).ok(),
                    Message::Ping(_) | Message::Pong(_) => {}
                    other => panic!("expected text frame, got {other:?}"),
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Assert nothing arrives for a short while.
    pub async fn expect_silence(&mut self) {
        if let Some(value) = self.recv_json_timeout(Duration::from_millis(200)).await {
            panic!("unexpected envelope for {}: {value}", self.id);
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws_tx.send(Message::Close(None)).await;
        let _ = self.ws_tx.close().await;
    }
}

pub async fn connect_path(
    addr: &SocketAddr,
    path: &str,
) -> Result<ClientStream, tokio_tungstenite::tungstenite::Error> {
    let url = format!("ws://{addr}{path}");
    tokio_tungstenite::connect_async(url).await.map(|(ws, _)| ws)
}

/// Send a plain HTTP/1.1 GET and return the raw response.
pub async fn http_get(addr: &SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    response
}
