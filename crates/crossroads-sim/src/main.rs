//! Signal controller simulator for the Crossroads bridge.
//!
//! Stands in for the roadside controller: connects to the bridge's device
//! port, cycles four lanes through green, yellow and all-red, reports every
//! change as one JSON line, and obeys manual-control commands relayed from
//! dashboards.
//!
//! # Architecture
//!
//! ```text
//! SignalController --report--> TCP line --> bridge --> dashboards
//! dashboards --> bridge --> TCP line --> ManualDirective --> SignalController
//! ```

mod config;
mod controller;
mod error;
mod link;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::SimConfig;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the bridge cannot be
/// reached, or the connection fails mid-stream.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("crossroads-sim starting");

    // Load configuration from environment
    let config = SimConfig::from_env()?;
    info!(
        bridge_addr = config.bridge_addr,
        green_ms = config.timings.green.as_millis(),
        yellow_ms = config.timings.yellow.as_millis(),
        all_red_ms = config.timings.all_red.as_millis(),
        "configuration loaded"
    );

    link::run(&config).await?;

    info!("crossroads-sim stopped");
    Ok(())
}
