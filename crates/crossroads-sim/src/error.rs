//! Error types for the signal simulator.

/// Errors that stop the simulator.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// The bridge could not be reached.
    #[error("failed to connect to bridge at {addr}: {source}")]
    Connect {
        /// Address that was dialed.
        addr: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Reading from or writing to the bridge failed.
    #[error("bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A report could not be serialized.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
