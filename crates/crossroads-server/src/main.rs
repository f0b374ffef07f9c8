//! Bridge binary for the Crossroads traffic-signal system.
//!
//! Relays newline-delimited JSON between one signal controller on a raw
//! TCP port and any number of dashboards on a `WebSocket` port.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `crossroads-config.yaml` (or `CROSSROADS_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Create the shared bridge state
//! 4. Bind both listeners and serve until Ctrl-C

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use crossroads_bridge::config::{LogFormat, LoggingConfig};
use crossroads_bridge::{BridgeConfig, BridgeState, start_server};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::ServerBinError;

/// Default config file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "crossroads-config.yaml";

/// Application entry point for the bridge.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a listener cannot
/// be bound.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("crossroads-server starting");
    info!(
        host = config.server.host,
        device_port = config.server.device_port,
        ws_port = config.server.ws_port,
        static_dir = ?config.server.static_dir,
        "Configuration loaded"
    );

    // 3. Create shared state.
    let state = Arc::new(BridgeState::new(config.server.greeting.clone()));

    // 4. Serve until Ctrl-C.
    start_server(&config.server, state)
        .await
        .map_err(ServerBinError::from)?;

    info!("crossroads-server stopped");
    Ok(())
}

/// Load configuration from `CROSSROADS_CONFIG` or `crossroads-config.yaml`.
///
/// A missing file falls back to defaults.
fn load_config() -> Result<BridgeConfig, ServerBinError> {
    let path = std::env::var("CROSSROADS_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    Ok(BridgeConfig::load_or_default(&path)?)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}
