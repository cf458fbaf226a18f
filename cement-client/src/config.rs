//! Configuration loading for cement-client.
//!
//! Configuration is loaded from a TOML file or built in code. Every field
//! has a default, so an empty file is a valid configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cement_core::ReconnectPolicy;

use crate::transport::TransportOptions;

/// Root configuration for the realtime client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Host of the realtime service (default: ws://127.0.0.1:3000).
    #[serde(default = "default_url")]
    pub url: String,
    /// Socket transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,
    /// How long to wait for a handshake answer in milliseconds (default: 10000).
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Maximum subscribe requests awaiting replies (default: 1024).
    #[serde(default = "default_max_pending_requests")]
    pub max_pending_requests: usize,
    /// Only deliver pushes for types bound while tracking (default: false).
    #[serde(default)]
    pub strict_type_bindings: bool,
    /// Log filter used by [`crate::logging::init_subscriber`] (default: info).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Socket transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Path the socket endpoint is mounted under (default: /realtime).
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Connect attempt timeout in milliseconds (default: 5000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Reconnect after the connection drops (default: true).
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
    /// First reconnect delay in milliseconds (default: 1000).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Reconnect delay ceiling in milliseconds (default: 30000).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Reconnect attempts before giving up, 0 for unbounded (default: 0).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

fn default_url() -> String {
    "ws://127.0.0.1:3000".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_max_pending_requests() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_path() -> String {
    "/realtime".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect: default_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_reconnect_attempts: 0,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            transport: TransportConfig::default(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            max_pending_requests: default_max_pending_requests(),
            strict_type_bindings: false,
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Set the service URL.
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    /// Set the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the pending request limit.
    pub fn with_max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max;
        self
    }

    /// Only deliver pushes for types bound while tracking.
    pub fn with_strict_type_bindings(mut self, strict: bool) -> Self {
        self.strict_type_bindings = strict;
        self
    }

    /// Handshake answer timeout.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Reconnect schedule for the transport.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.transport.reconnect,
            min_delay: Duration::from_millis(self.transport.reconnect_delay_ms),
            max_delay: Duration::from_millis(self.transport.reconnect_max_delay_ms),
            max_attempts: self.transport.max_reconnect_attempts,
        }
    }

    /// Options to open a transport implementation with.
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            url: self.url.clone(),
            base_path: self.transport.base_path.clone(),
            connect_timeout: Duration::from_millis(self.transport.connect_timeout_ms),
            reconnect: self.reconnect_policy(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to parse inline configuration text.
    #[error("failed to parse config: {0}")]
    InvalidToml(#[from] toml::de::Error),
}
