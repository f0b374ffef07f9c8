//! Envelopes pushed to dashboard clients.
//!
//! Every frame the bridge sends to a dashboard is a JSON object whose
//! `type` field names the kind of payload:
//!
//! ```json
//! {"type":"connection","message":"Connected to traffic light bridge server"}
//! {"type":"traffic_update","data":{"timestamp":"...","intersection":[...]}}
//! ```

use serde::Serialize;
use serde_json::Value;

/// A server-to-client frame on the dashboard WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEnvelope {
    /// Greeting sent once, immediately after a client is accepted.
    Connection {
        /// Human-readable greeting text.
        message: String,
    },
    /// A device report, forwarded verbatim as `data`.
    TrafficUpdate {
        /// The JSON value exactly as the device produced it.
        data: Value,
    },
}

impl BridgeEnvelope {
    /// Build the handshake envelope.
    pub fn greeting(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Wrap a device report.
    pub const fn traffic_update(data: Value) -> Self {
        Self::TrafficUpdate { data }
    }

    /// Serialize to the compact JSON text sent in a WebSocket frame.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the payload cannot be encoded.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
