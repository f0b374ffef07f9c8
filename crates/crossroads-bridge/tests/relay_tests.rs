//! End-to-end tests for the bridge over real sockets.
//!
//! Each test binds a bridge on ephemeral ports, connects a controller
//! with a plain `TcpStream` and dashboards/peers with `tokio-tungstenite`,
//! and checks what crosses the wire.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crossroads_bridge::BridgeState;
use crossroads_bridge::config::ServerConfig;
use crossroads_bridge::server::{BridgeServer, ServerError};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);
const QUIET: Duration = Duration::from_millis(200);

struct TestBridge {
    device_addr: SocketAddr,
    ws_addr: SocketAddr,
    state: Arc<BridgeState>,
    stop: oneshot::Sender<()>,
    server: JoinHandle<Result<(), ServerError>>,
}

async fn start_bridge() -> TestBridge {
    let config = ServerConfig {
        host: "127.0.0.1".to_owned(),
        device_port: 0,
        ws_port: 0,
        ..ServerConfig::default()
    };
    let state = Arc::new(BridgeState::new("Connected to traffic light bridge server"));
    let server = BridgeServer::bind(&config, Arc::clone(&state)).await.unwrap();
    let device_addr = server.device_addr();
    let ws_addr = server.ws_addr();

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(server.serve(async move {
        let _ = stopped.await;
    }));

    TestBridge {
        device_addr,
        ws_addr,
        state,
        stop,
        server,
    }
}

/// Poll `check` until it returns true or the wait budget runs out.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(WAIT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn connect_dashboard(bridge: &TestBridge) -> Ws {
    let (mut ws, _) = connect_async(format!("ws://{}/ws", bridge.ws_addr)).await.unwrap();
    let greeting = next_json(&mut ws).await;
    assert_eq!(
        greeting,
        json!({"type": "connection", "message": "Connected to traffic light bridge server"})
    );
    ws
}

async fn connect_peer(bridge: &TestBridge) -> Ws {
    let (ws, _) = connect_async(format!("ws://{}/peer", bridge.ws_addr)).await.unwrap();
    ws
}

async fn connect_device(bridge: &TestBridge) -> TcpStream {
    let before = bridge.state.device.current().await.map(|d| d.id);
    let stream = TcpStream::connect(bridge.device_addr).await.unwrap();
    let state = Arc::clone(&bridge.state);
    eventually(|| {
        let state = Arc::clone(&state);
        async move {
            let now = state.device.current().await.map(|d| d.id);
            now.is_some() && now != before
        }
    })
    .await;
    stream
}

async fn next_text(ws: &mut Ws) -> String {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        match msg {
            Message::Text(text) => return text.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn next_json(ws: &mut Ws) -> Value {
    serde_json::from_str(&next_text(ws).await).unwrap()
}

async fn assert_silent(ws: &mut Ws) {
    assert!(timeout(QUIET, ws.next()).await.is_err(), "unexpected frame");
}

/// Read until the server ends the connection.
async fn assert_closed_by_server(ws: &mut Ws) {
    timeout(WAIT, async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await
    .expect("connection still open");
}

#[tokio::test]
async fn device_reports_reach_every_dashboard() {
    let bridge = start_bridge().await;
    let mut a = connect_dashboard(&bridge).await;
    let mut b = connect_dashboard(&bridge).await;
    let mut device = connect_device(&bridge).await;

    let report = r#"{"timestamp":"2025-03-01 08:00:00","intersection":[{"lane":1,"status":"GREEN"}]}"#;
    // Split mid-message, with a malformed line in front.
    device.write_all(b"{bad json\n").await.unwrap();
    device.write_all(&report.as_bytes()[..20]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    device.write_all(&report.as_bytes()[20..]).await.unwrap();
    device.write_all(b"\n").await.unwrap();

    let expected = json!({"type": "traffic_update", "data": serde_json::from_str::<Value>(report).unwrap()});
    assert_eq!(next_json(&mut a).await, expected);
    assert_eq!(next_json(&mut b).await, expected);
    assert_silent(&mut a).await;

    assert_eq!(bridge.state.stats.updates_relayed(), 1);
    assert_eq!(bridge.state.stats.malformed_frames(), 1);
}

#[tokio::test]
async fn control_command_is_written_to_device_once() {
    let bridge = start_bridge().await;
    let mut dashboard = connect_dashboard(&bridge).await;
    let mut device = connect_device(&bridge).await;

    dashboard
        .send(Message::text(r#"{"manual_control":true,"lane":2}"#))
        .await
        .unwrap();

    let expected = b"{\"manual_control\":true,\"lane\":2}\n";
    let mut buf = vec![0_u8; expected.len()];
    timeout(WAIT, device.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(buf, expected);

    let mut extra = [0_u8; 1];
    assert!(timeout(QUIET, device.read(&mut extra)).await.is_err(), "command written twice");
    assert_eq!(bridge.state.stats.commands_forwarded(), 1);
}

#[tokio::test]
async fn command_without_device_is_dropped_and_bridge_survives() {
    let bridge = start_bridge().await;
    let mut dashboard = connect_dashboard(&bridge).await;

    dashboard
        .send(Message::text(r#"{"manual_control":true,"lane":2}"#))
        .await
        .unwrap();
    let state = Arc::clone(&bridge.state);
    eventually(|| {
        let state = Arc::clone(&state);
        async move { state.stats.commands_dropped() == 1 }
    })
    .await;

    // The relay keeps working afterwards.
    let mut device = connect_device(&bridge).await;
    device.write_all(b"{\"a\":1}\n").await.unwrap();
    assert_eq!(
        next_json(&mut dashboard).await,
        json!({"type": "traffic_update", "data": {"a": 1}})
    );
}

#[tokio::test]
async fn unrecognized_and_malformed_client_frames_keep_connection_open() {
    let bridge = start_bridge().await;
    let mut dashboard = connect_dashboard(&bridge).await;
    let mut device = connect_device(&bridge).await;

    dashboard.send(Message::text("{bad json")).await.unwrap();
    dashboard.send(Message::text(r#"{"lane":3}"#)).await.unwrap();

    device.write_all(b"{\"still\":\"open\"}\n").await.unwrap();
    assert_eq!(
        next_json(&mut dashboard).await,
        json!({"type": "traffic_update", "data": {"still": "open"}})
    );

    let mut extra = [0_u8; 1];
    assert!(timeout(QUIET, device.read(&mut extra)).await.is_err(), "nothing should reach the device");
}

#[tokio::test]
async fn disconnected_dashboard_leaves_the_broadcast_set() {
    let bridge = start_bridge().await;
    let mut stays = connect_dashboard(&bridge).await;
    let mut leaves = connect_dashboard(&bridge).await;
    let mut device = connect_device(&bridge).await;

    leaves.close(None).await.unwrap();
    let state = Arc::clone(&bridge.state);
    eventually(|| {
        let state = Arc::clone(&state);
        async move { state.clients.len().await == 1 }
    })
    .await;

    device.write_all(b"{\"n\":1}\n").await.unwrap();
    assert_eq!(next_json(&mut stays).await["data"], json!({"n": 1}));
    assert_eq!(bridge.state.stats.updates_relayed(), 1);
}

#[tokio::test]
async fn peer_frames_skip_the_sender() {
    let bridge = start_bridge().await;
    let mut a = connect_peer(&bridge).await;
    let mut b = connect_peer(&bridge).await;
    let mut c = connect_peer(&bridge).await;
    let state = Arc::clone(&bridge.state);
    eventually(|| {
        let state = Arc::clone(&state);
        async move { state.peers.open_count().await == 3 }
    })
    .await;

    a.send(Message::text("hello from a")).await.unwrap();

    assert_eq!(next_text(&mut b).await, "hello from a");
    assert_eq!(next_text(&mut c).await, "hello from a");
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn reconnecting_device_replaces_the_old_one() {
    let bridge = start_bridge().await;
    let mut dashboard = connect_dashboard(&bridge).await;
    let mut old = connect_device(&bridge).await;
    let mut new = connect_device(&bridge).await;

    // The superseded connection is closed by the bridge.
    let mut buf = [0_u8; 16];
    let n = timeout(WAIT, old.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(n, 0);

    // Commands go to the new connection.
    dashboard
        .send(Message::text(r#"{"manual_control":false}"#))
        .await
        .unwrap();
    let expected = b"{\"manual_control\":false}\n";
    let mut line = vec![0_u8; expected.len()];
    timeout(WAIT, new.read_exact(&mut line)).await.unwrap().unwrap();
    assert_eq!(line, expected);
    assert!(bridge.state.device.current().await.is_some());
}

#[tokio::test]
async fn device_disconnect_clears_the_slot() {
    let bridge = start_bridge().await;
    let mut device = connect_device(&bridge).await;

    // A trailing partial frame is discarded on close.
    device.write_all(b"{\"partial\":").await.unwrap();
    drop(device);

    let state = Arc::clone(&bridge.state);
    eventually(|| {
        let state = Arc::clone(&state);
        async move { state.device.current().await.is_none() }
    })
    .await;
    assert_eq!(bridge.state.stats.updates_relayed(), 0);
}

#[tokio::test]
async fn shutdown_closes_dashboards_and_peers() {
    let bridge = start_bridge().await;
    let mut dashboard = connect_dashboard(&bridge).await;
    let mut peer = connect_peer(&bridge).await;
    let state = Arc::clone(&bridge.state);
    eventually(|| {
        let state = Arc::clone(&state);
        async move { state.peers.open_count().await == 1 }
    })
    .await;

    let TestBridge { stop, server, .. } = bridge;
    stop.send(()).unwrap();
    let served = timeout(WAIT, server).await.unwrap().unwrap();
    assert!(served.is_ok());
    assert!(state.clients.is_empty().await);
    assert!(state.peers.is_empty().await);

    assert_closed_by_server(&mut dashboard).await;
    assert_closed_by_server(&mut peer).await;
}
