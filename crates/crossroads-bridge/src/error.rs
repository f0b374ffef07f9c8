//! Error types for the bridge.
//!
//! [`RelayError`] covers per-message failures on the relay paths; none of
//! them is fatal to the process. [`BridgeError`] is the HTTP-facing error
//! with an Axum [`IntoResponse`](axum::response::IntoResponse)
//! implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// A message that could not be relayed.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No device connection is registered, or its writer has gone away.
    #[error("no device connected")]
    DeviceUnavailable,

    /// The message could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned from the bridge's HTTP endpoints.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No route or asset matches the path.
    #[error("not found: {0}")]
    NotFound(String),
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(path) => (StatusCode::NOT_FOUND, format!("no route for {path}")),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
