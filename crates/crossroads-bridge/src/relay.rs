//! Routing of frames received from dashboard clients.

use crossroads_types::{ClientId, ClientMessage};
use tracing::{info, warn};

use crate::state::BridgeState;

/// What happened to one client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// A control command was queued for the device.
    Forwarded,
    /// A control command was dropped because no device is connected.
    Dropped,
    /// Valid JSON without the control field; logged only.
    Unrecognized,
    /// Not valid JSON; logged and discarded.
    Malformed,
}

/// Handle one text frame from a dashboard client.
///
/// Control commands go to the device; anything else is logged. No
/// outcome closes the client's connection.
pub async fn handle_client_text(state: &BridgeState, client: ClientId, text: &str) -> RelayOutcome {
    let msg = match ClientMessage::parse(text) {
        Ok(msg) => msg,
        Err(e) => {
            state.stats.record_malformed();
            warn!(%client, error = %e, "failed to parse client message");
            return RelayOutcome::Malformed;
        }
    };

    match msg {
        ClientMessage::Control(command) => match state.forward_command(&command).await {
            Ok(()) => RelayOutcome::Forwarded,
            Err(_dropped) => RelayOutcome::Dropped,
        },
        ClientMessage::Unrecognized(value) => {
            info!(%client, message = %value, "received unrecognized message from client");
            RelayOutcome::Unrecognized
        }
    }
}
