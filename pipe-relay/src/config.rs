//! Configuration loading for airpipe-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for airpipe-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Connection limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the WebSocket listener (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Connection limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Largest accepted WebSocket message in bytes (default: 8 MiB).
    ///
    /// Must exceed the largest chunk a client sends plus framing overhead.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Seconds a new connection has to upgrade and send its join (default: 10).
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
    /// Maximum slots with one party waiting (default: 1024).
    #[serde(default = "default_max_pending_sessions")]
    pub max_pending_sessions: usize,
    /// Frames buffered per connection before the forwarding side is paused (default: 32).
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl LimitsConfig {
    /// Join timeout as a duration.
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_message_size() -> usize {
    8 * 1024 * 1024 // 8 MiB
}

fn default_join_timeout_secs() -> u64 {
    10
}

fn default_max_pending_sessions() -> usize {
    1024
}

fn default_outbound_queue() -> usize {
    32
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            join_timeout_secs: default_join_timeout_secs(),
            max_pending_sessions: default_max_pending_sessions(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.limits.max_message_size, 8 * 1024 * 1024);
        assert_eq!(config.limits.join_timeout(), Duration::from_secs(10));
        assert_eq!(config.limits.max_pending_sessions, 1024);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:5000"

[limits]
max_message_size = 1048576
join_timeout_secs = 3
max_pending_sessions = 16
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:5000");
        assert_eq!(config.limits.max_message_size, 1048576);
        assert_eq!(config.limits.join_timeout_secs, 3);
        assert_eq!(config.limits.max_pending_sessions, 16);
        assert_eq!(config.limits.outbound_queue, 32);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.limits.join_timeout_secs, 10);
    }

    #[test]
    fn from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");

        let missing = Config::from_file(&path).unwrap_err();
        assert!(matches!(missing, ConfigError::ReadError { .. }));
        assert!(missing.to_string().contains("relay.toml"));

        std::fs::write(&path, "[limits]\njoin_timeout_secs = \"soon\"\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::ParseError { .. })
        ));

        std::fs::write(&path, "[server]\nbind_address = \"127.0.0.1:1\"\n").unwrap();
        assert_eq!(
            Config::from_file(&path).unwrap().server.bind_address,
            "127.0.0.1:1"
        );
    }
}
