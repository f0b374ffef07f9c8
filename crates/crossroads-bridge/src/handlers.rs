//! REST handlers for the bridge.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::Uri;
use chrono::{DateTime, Utc};

use crate::error::BridgeError;
use crate::state::{BridgeState, LastUpdate};

/// Response body for `GET /api/status`.
#[derive(Debug, serde::Serialize)]
pub struct StatusResponse {
    /// Whether a controller is attached.
    pub device_connected: bool,
    /// Remote address of the controller.
    pub device_addr: Option<String>,
    /// When the controller connected.
    pub device_connected_at: Option<DateTime<Utc>>,
    /// Registered dashboard clients.
    pub clients: usize,
    /// Registered relay peers.
    pub peers: usize,
    /// Device reports broadcast since start.
    pub updates_relayed: u64,
    /// Control commands forwarded to the device.
    pub commands_forwarded: u64,
    /// Control commands dropped for lack of a device.
    pub commands_dropped: u64,
    /// Frames that were not valid JSON.
    pub malformed_frames: u64,
    /// The latest device report.
    pub last_update: Option<LastUpdate>,
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Report device presence, connection counts and relay counters.
pub async fn status(State(state): State<Arc<BridgeState>>) -> Json<StatusResponse> {
    let device = state.device.current().await;

    Json(StatusResponse {
        device_connected: device.is_some(),
        device_addr: device.as_ref().map(|d| d.addr.to_string()),
        device_connected_at: device.as_ref().map(|d| d.connected_at),
        clients: state.clients.len().await,
        peers: state.peers.len().await,
        updates_relayed: state.stats.updates_relayed(),
        commands_forwarded: state.stats.commands_forwarded(),
        commands_dropped: state.stats.commands_dropped(),
        malformed_frames: state.stats.malformed_frames(),
        last_update: state.stats.last_update().await,
    })
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// JSON 404 for unknown paths when no static directory is configured.
pub async fn not_found(uri: Uri) -> BridgeError {
    BridgeError::NotFound(uri.path().to_owned())
}
