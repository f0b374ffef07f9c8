//! Configuration loading and typed config structures for the bridge.
//!
//! The canonical configuration lives in `crossroads-config.yaml`. Every
//! field has a default, so a missing file or an empty document yields a
//! working bridge on the ports the controller and dashboards expect
//! (9999 for the device stream, 3001 for WebSockets).

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Greeting sent to every dashboard client on connect.
pub const DEFAULT_GREETING: &str = "Connected to traffic light bridge server";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv {
        /// The environment variable name.
        name: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BridgeConfig {
    /// Listener addresses and client-facing behaviour.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Load configuration from a YAML file at the given path, then apply
    /// environment overrides.
    ///
    /// Environment variables override YAML values:
    /// - `BRIDGE_HOST` overrides `server.host`
    /// - `BRIDGE_DEVICE_PORT` overrides `server.device_port`
    /// - `BRIDGE_WS_PORT` overrides `server.ws_port`
    /// - `BRIDGE_STATIC_DIR` overrides `server.static_dir`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::InvalidEnv`] if an override is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    /// Environment overrides apply either way.
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file).
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            let mut config = Self::default();
            config.server.apply_env_overrides()?;
            Ok(config)
        }
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse_with(yaml, env_var)
    }

    /// Parse configuration from a YAML string, taking overrides from
    /// `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::InvalidEnv`] if an override is malformed.
    pub fn parse_with<F>(yaml: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.server.apply_overrides(lookup)?;
        Ok(config)
    }
}

/// Listener and client-facing settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Address both listeners bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port the signal controller connects to.
    #[serde(default = "default_device_port")]
    pub device_port: u16,

    /// HTTP/WebSocket port for dashboards and relay peers.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// Greeting text in the `connection` envelope.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Directory served as the HTTP fallback (dashboard assets).
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Override listener settings with environment variables when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if a port variable is not a
    /// valid `u16`.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(env_var)
    }

    /// Apply the `BRIDGE_*` overrides resolved through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if a port value is not a
    /// valid `u16`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("BRIDGE_HOST") {
            self.host = val;
        }
        if let Some(val) = lookup("BRIDGE_DEVICE_PORT") {
            self.device_port = parse_port("BRIDGE_DEVICE_PORT", val)?;
        }
        if let Some(val) = lookup("BRIDGE_WS_PORT") {
            self.ws_port = parse_port("BRIDGE_WS_PORT", val)?;
        }
        if let Some(val) = lookup("BRIDGE_STATIC_DIR") {
            self.static_dir = Some(PathBuf::from(val));
        }
        Ok(())
    }

    /// `host:device_port`.
    pub fn device_addr(&self) -> String {
        format!("{}:{}", self.host, self.device_port)
    }

    /// `host:ws_port`.
    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            device_port: default_device_port(),
            ws_port: default_ws_port(),
            greeting: default_greeting(),
            static_dir: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_port(name: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|_parse| ConfigError::InvalidEnv { name, value })
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_device_port() -> u16 {
    9999
}

const fn default_ws_port() -> u16 {
    3001
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}
