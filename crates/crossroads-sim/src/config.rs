//! Configuration for the signal simulator.
//!
//! All configuration is loaded from environment variables, every one of
//! them optional.

use std::time::Duration;

use crate::controller::PhaseTimings;
use crate::error::SimError;

/// Complete simulator configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Bridge device listener (e.g. `127.0.0.1:9999`).
    pub bridge_addr: String,
    /// Automatic cycle timings.
    pub timings: PhaseTimings,
}

impl SimConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional variables:
    /// - `BRIDGE_ADDR` -- bridge device listener (default `127.0.0.1:9999`)
    /// - `SIM_GREEN_MS` -- green phase in milliseconds (default 5000)
    /// - `SIM_YELLOW_MS` -- yellow phase in milliseconds (default 2000)
    /// - `SIM_ALL_RED_MS` -- all-red clearance in milliseconds (default 1000)
    pub fn from_env() -> Result<Self, SimError> {
        let bridge_addr =
            std::env::var("BRIDGE_ADDR").unwrap_or_else(|_| "127.0.0.1:9999".to_owned());

        let timings = PhaseTimings {
            green: millis_var("SIM_GREEN_MS", 5000)?,
            yellow: millis_var("SIM_YELLOW_MS", 2000)?,
            all_red: millis_var("SIM_ALL_RED_MS", 1000)?,
        };

        Ok(Self {
            bridge_addr,
            timings,
        })
    }
}

/// Read a millisecond duration, falling back to `default` when unset.
fn millis_var(name: &str, default: u64) -> Result<Duration, SimError> {
    std::env::var(name).map_or(Ok(Duration::from_millis(default)), |raw| {
        parse_millis(name, &raw)
    })
}

fn parse_millis(name: &str, raw: &str) -> Result<Duration, SimError> {
    let ms: u64 = raw
        .trim()
        .parse()
        .map_err(|e| SimError::Config(format!("invalid {name}: {e}")))?;
    if ms == 0 {
        return Err(SimError::Config(format!("{name} must be greater than zero")));
    }
    Ok(Duration::from_millis(ms))
}
