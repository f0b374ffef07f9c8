//! Error types for the bridge binary.

/// Top-level error for the bridge binary.
///
/// Each variant wraps a subsystem error so `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum ServerBinError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crossroads_bridge::config::ConfigError,
    },

    /// Binding or serving failed.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: crossroads_bridge::ServerError,
    },
}
