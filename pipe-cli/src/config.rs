//! Configuration management for airpipe.
//!
//! An optional `config.toml` in the platform config directory (or the file
//! named by `--config`) supplies defaults; command line flags win.

use anyhow::{Context, Result};
use pipe_client::{DEFAULT_CHUNK_SIZE, DEFAULT_PEER_TIMEOUT, DEFAULT_RELAY};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Values read from the config file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Relay address (`wss://...`).
    pub relay: Option<String>,
    /// Plaintext bytes per chunk.
    pub chunk_size: Option<usize>,
    /// Seconds to wait for the other party.
    pub peer_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Load the config file.
    ///
    /// An explicit path must exist. The default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Command line overrides.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--relay`
    pub relay: Option<String>,
    /// `--chunk-size`
    pub chunk_size: Option<usize>,
    /// `--timeout`
    pub peer_timeout_secs: Option<u64>,
}

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Relay address.
    pub relay: String,
    /// Plaintext bytes per chunk.
    pub chunk_size: usize,
    /// Wait for the other party.
    pub peer_timeout: Duration,
}

impl Settings {
    /// Merge built-in defaults, the config file and flags, in that order.
    pub fn resolve(file: FileConfig, flags: Overrides) -> Self {
        Self {
            relay: flags
                .relay
                .or(file.relay)
                .unwrap_or_else(|| DEFAULT_RELAY.to_string()),
            chunk_size: flags
                .chunk_size
                .or(file.chunk_size)
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            peer_timeout: flags
                .peer_timeout_secs
                .or(file.peer_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_PEER_TIMEOUT),
        }
    }
}

/// `<config dir>/airpipe/config.toml`, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "sanyamgarg", "airpipe")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_file_or_flags() {
        let settings = Settings::resolve(FileConfig::default(), Overrides::default());
        assert_eq!(settings.relay, DEFAULT_RELAY);
        assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(settings.peer_timeout, DEFAULT_PEER_TIMEOUT);
    }

    #[test]
    fn flags_win_over_file() {
        let file = FileConfig {
            relay: Some("wss://file.example".into()),
            chunk_size: Some(1024),
            peer_timeout_secs: Some(60),
        };
        let flags = Overrides {
            relay: Some("ws://127.0.0.1:9000".into()),
            chunk_size: None,
            peer_timeout_secs: Some(5),
        };

        let settings = Settings::resolve(file, flags);
        assert_eq!(settings.relay, "ws://127.0.0.1:9000");
        assert_eq!(settings.chunk_size, 1024);
        assert_eq!(settings.peer_timeout, Duration::from_secs(5));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("airpipe.toml");
        std::fs::write(&path, "relay = \"wss://relay.example\"\npeer_timeout_secs = 30\n").unwrap();

        let file = FileConfig::load(Some(&path)).unwrap();
        assert_eq!(file.relay.as_deref(), Some("wss://relay.example"));
        assert_eq!(file.chunk_size, None);
        assert_eq!(file.peer_timeout_secs, Some(30));
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = TempDir::new().unwrap();
        let err = FileConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("airpipe.toml");
        std::fs::write(&path, "relay_url = \"wss://typo.example\"\n").unwrap();
        assert!(FileConfig::load(Some(&path)).is_err());
    }
}
