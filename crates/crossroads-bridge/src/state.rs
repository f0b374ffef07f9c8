//! Shared state for one running bridge.
//!
//! [`BridgeState`] owns both client registries, the device slot, and the
//! relay counters. It is created once at startup, wrapped in [`Arc`], and
//! handed to every connection task and HTTP handler. [`shutdown`] clears
//! it when the process stops.
//!
//! [`shutdown`]: BridgeState::shutdown

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use crossroads_types::{BridgeEnvelope, ControlCommand, IntersectionReport};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_GREETING;
use crate::device::DeviceSlot;
use crate::error::RelayError;
use crate::registry::ClientRegistry;

/// The most recent report received from the device.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LastUpdate {
    /// When the bridge received it.
    pub received_at: DateTime<Utc>,
    /// The report as sent by the device.
    pub data: Value,
}

/// Relay counters exposed on the status endpoint.
#[derive(Debug, Default)]
pub struct RelayStats {
    updates_relayed: AtomicU64,
    commands_forwarded: AtomicU64,
    commands_dropped: AtomicU64,
    malformed_frames: AtomicU64,
    last_update: RwLock<Option<LastUpdate>>,
}

impl RelayStats {
    /// Device reports broadcast so far.
    pub fn updates_relayed(&self) -> u64 {
        self.updates_relayed.load(Ordering::Relaxed)
    }

    /// Control commands handed to the device writer.
    pub fn commands_forwarded(&self) -> u64 {
        self.commands_forwarded.load(Ordering::Relaxed)
    }

    /// Control commands dropped because no device was connected.
    pub fn commands_dropped(&self) -> u64 {
        self.commands_dropped.load(Ordering::Relaxed)
    }

    /// Frames on either stream that were not valid JSON.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    /// Count a frame that failed to parse.
    pub fn record_malformed(&self) {
        let _ = self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// The latest device report, if one arrived.
    pub async fn last_update(&self) -> Option<LastUpdate> {
        self.last_update.read().await.clone()
    }
}

/// Shared state for the bridge.
#[derive(Debug)]
pub struct BridgeState {
    /// Dashboard clients receiving device reports.
    pub clients: ClientRegistry,
    /// Participants of the peer relay.
    pub peers: ClientRegistry,
    /// The single controller connection.
    pub device: DeviceSlot,
    /// Relay counters.
    pub stats: RelayStats,
    greeting: String,
}

impl BridgeState {
    /// Create state with the given handshake greeting.
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            clients: ClientRegistry::new("dashboard"),
            peers: ClientRegistry::new("peer"),
            device: DeviceSlot::new(),
            stats: RelayStats::default(),
            greeting: greeting.into(),
        }
    }

    /// The text sent in the `connection` envelope.
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Wrap a device report in a `traffic_update` envelope and broadcast
    /// it to every open dashboard client.
    ///
    /// Returns the number of clients it was queued for.
    pub async fn publish_traffic(&self, data: Value) -> usize {
        if let Some(report) = IntersectionReport::from_value(&data) {
            debug!(timestamp = report.timestamp, lanes = report.summary(), "received device report");
        } else {
            debug!(%data, "received device message");
        }

        *self.stats.last_update.write().await = Some(LastUpdate {
            received_at: Utc::now(),
            data: data.clone(),
        });

        let json = match BridgeEnvelope::traffic_update(data).to_json() {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize traffic update: {e}");
                return 0;
            }
        };
        let _ = self.stats.updates_relayed.fetch_add(1, Ordering::Relaxed);
        self.clients.broadcast(&Message::Text(json.into()), None).await
    }

    /// Forward a control command to the device, newline-terminated.
    ///
    /// Never queued or retried: with no device attached the command is
    /// dropped and the drop is logged.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DeviceUnavailable`] if no device is attached,
    /// or [`RelayError::Serialization`] if the command cannot be encoded.
    pub async fn forward_command(&self, command: &ControlCommand) -> Result<(), RelayError> {
        let line = command.to_line()?;
        match self.device.send_line(line).await {
            Ok(()) => {
                let _ = self.stats.commands_forwarded.fetch_add(1, Ordering::Relaxed);
                info!(
                    command = ?command.as_object(),
                    directive = ?command.directive(),
                    "forwarded manual control command to device"
                );
                Ok(())
            }
            Err(e) => {
                let _ = self.stats.commands_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(command = ?command.as_object(), "device not connected, dropping manual control command");
                Err(e)
            }
        }
    }

    /// Close every connection: dashboards and peers receive a close frame
    /// and leave their registries, and the device task is told to close.
    pub async fn shutdown(&self) {
        self.clients.clear().await;
        self.peers.clear().await;
        self.device.clear().await;
        info!("bridge state cleared");
    }
}

impl Default for BridgeState {
    fn default() -> Self {
        Self::new(DEFAULT_GREETING)
    }
}
