//! `WebSocket` handlers for dashboards and relay peers.
//!
//! Both routes share one connection loop. A dashboard (`GET /`, `GET /ws`)
//! is greeted with a `connection` envelope, then receives every device
//! report; its text frames are routed through [`relay`](crate::relay). A
//! peer (`GET /peer`) gets no greeting, and each frame it sends is
//! forwarded unchanged to every other open peer.
//!
//! Every socket is split: the reader runs in the handler task, and a
//! writer task drains the client's outbound queue into the sink.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use crossroads_types::{BridgeEnvelope, ClientId};
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::registry::ClientRegistry;
use crate::relay;
use crate::state::BridgeState;

/// How long a closing connection may take to flush its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Which side of the bridge a socket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Dashboard,
    Peer,
}

impl Role {
    const fn label(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Peer => "peer",
        }
    }

    fn registry(self, state: &BridgeState) -> &ClientRegistry {
        match self {
            Self::Dashboard => &state.clients,
            Self::Peer => &state.peers,
        }
    }
}

/// Upgrade to a dashboard connection.
///
/// # Route
///
/// `GET /` and `GET /ws`
pub async fn ws_bridge(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BridgeState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state, Role::Dashboard))
}

/// Upgrade to a peer-relay connection.
///
/// # Route
///
/// `GET /peer`
pub async fn ws_peer(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BridgeState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state, Role::Peer))
}

async fn handle_socket(socket: WebSocket, state: Arc<BridgeState>, role: Role) {
    let registry = role.registry(&state);
    let (handle, mut outbound) = registry.register().await;
    let id = handle.id();
    let (mut sink, mut stream) = socket.split();

    // Open before the greeting: broadcasts queue behind it, since the
    // writer that drains them only starts once the greeting is sent.
    handle.mark_open();

    if role == Role::Dashboard {
        let greeting = match BridgeEnvelope::greeting(state.greeting()).to_json() {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize greeting: {e}");
                registry.remove(id).await;
                return;
            }
        };
        if sink.send(Message::Text(greeting.into())).await.is_err() {
            debug!(client = %id, "WebSocket client disconnected before greeting");
            registry.remove(id).await;
            return;
        }
    }

    let total = registry.len().await;
    info!(client = %id, role = role.label(), total, "WebSocket client connected");

    let mut writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                debug!(client = %id, "WebSocket client disconnected (send failed)");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut shutting_down = false;
    loop {
        let frame = tokio::select! {
            () = handle.closed() => {
                shutting_down = true;
                break;
            }
            frame = stream.next() => frame,
        };
        let Some(frame) = frame else {
            break;
        };
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(msg @ (Message::Text(_) | Message::Binary(_))) => {
                on_frame(&state, role, id, msg).await;
            }
            // Pings are answered by the protocol layer.
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                warn!(client = %id, role = role.label(), error = %e, "WebSocket client error");
                break;
            }
        }
    }

    handle.mark_closing();
    registry.remove(id).await;
    if shutting_down {
        // Let the writer flush the close frame queued by the registry.
        if timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            writer.abort();
        }
        info!(client = %id, role = role.label(), "WebSocket client closed by shutdown");
    } else {
        writer.abort();
        info!(client = %id, role = role.label(), "WebSocket client disconnected");
    }
}

async fn on_frame(state: &BridgeState, role: Role, id: ClientId, msg: Message) {
    match role {
        Role::Peer => {
            let delivered = state.peers.broadcast(&msg, Some(id)).await;
            debug!(client = %id, delivered, "relayed peer frame");
        }
        Role::Dashboard => match &msg {
            Message::Text(text) => {
                relay::handle_client_text(state, id, text.as_str()).await;
            }
            Message::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => {
                    relay::handle_client_text(state, id, text).await;
                }
                Err(e) => {
                    state.stats.record_malformed();
                    warn!(client = %id, error = %e, "dropping non-UTF-8 binary frame");
                }
            },
            _ => {}
        },
    }
}
