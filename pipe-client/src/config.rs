//! Session configuration.
//!
//! A [`SessionConfig`] fully parameterizes one transfer: which relay, which
//! rendezvous token, which key, and the tunable limits. Nothing is global.

use std::time::Duration;

use pipe_core::{PairingError, PairingLink};
use pipe_types::{Role, Token};

use crate::crypto::SessionKey;
use crate::error::TransferError;

/// Public relay used when none is configured.
pub const DEFAULT_RELAY: &str = "wss://airpipe.sanyamgarg.com";

/// Default plaintext bytes per chunk (256 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Largest accepted chunk size (4 MiB).
pub const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Default time to wait for the other party (long enough to scan a QR code).
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default time allowed to open the relay channel and join.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for a single frame write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for one Sender or Receiver session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay WebSocket base address (`ws://` or `wss://`).
    pub relay_url: String,
    /// Rendezvous token shared with the peer.
    pub token: Token,
    /// Session key shared with the peer out-of-band.
    pub key: SessionKey,
    /// Plaintext bytes per chunk.
    pub chunk_size: usize,
    /// Default wait for the peer when none is given explicitly.
    pub peer_timeout: Duration,
    /// Bound on opening the channel and joining.
    pub connect_timeout: Duration,
    /// Bound on a single frame write.
    pub write_timeout: Duration,
}

impl SessionConfig {
    /// Create a configuration from explicit token and key.
    pub fn new(relay_url: &str, token: Token, key: SessionKey) -> Self {
        Self {
            relay_url: relay_url.trim_end_matches('/').to_string(),
            token,
            key,
            chunk_size: DEFAULT_CHUNK_SIZE,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Create a configuration with a fresh random token and key.
    pub fn generate(relay_url: &str) -> Result<Self, TransferError> {
        let token = Token::generate().map_err(|e| TransferError::EntropyFailure(e.to_string()))?;
        let key = SessionKey::generate()?;
        Ok(Self::new(relay_url, token, key))
    }

    /// Create a configuration that joins the slot described by a link.
    pub fn from_link(link: &PairingLink) -> Result<Self, TransferError> {
        let key = SessionKey::from_text(link.key_text())?;
        Ok(Self::new(link.relay(), link.token(), key))
    }

    /// Set the chunk size, clamped to `1..=MAX_CHUNK_SIZE`.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    /// Set the default peer wait.
    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-frame write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Build the link the other party opens to join this session.
    ///
    /// `role` is the role of the party sharing the link.
    pub fn pairing_link(&self, role: Role) -> Result<PairingLink, PairingError> {
        PairingLink::new(&self.relay_url, role, self.token, &self.key.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::generate("ws://127.0.0.1:9000/").unwrap();
        assert_eq!(config.relay_url, "ws://127.0.0.1:9000");
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.peer_timeout, DEFAULT_PEER_TIMEOUT);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.write_timeout, DEFAULT_WRITE_TIMEOUT);
    }

    #[test]
    fn generated_sessions_are_independent() {
        let a = SessionConfig::generate(DEFAULT_RELAY).unwrap();
        let b = SessionConfig::generate(DEFAULT_RELAY).unwrap();
        assert_ne!(a.token, b.token);
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn chunk_size_is_clamped() {
        let config = SessionConfig::generate(DEFAULT_RELAY).unwrap();
        assert_eq!(config.clone().with_chunk_size(0).chunk_size, 1);
        assert_eq!(
            config.clone().with_chunk_size(usize::MAX).chunk_size,
            MAX_CHUNK_SIZE
        );
        assert_eq!(config.with_chunk_size(64 * 1024).chunk_size, 64 * 1024);
    }

    #[test]
    fn link_roundtrip_preserves_session() {
        let config = SessionConfig::generate("wss://relay.example.com").unwrap();
        let link = config.pairing_link(Role::Offer).unwrap();
        let url = link.to_url().unwrap();
        assert!(url.starts_with("https://relay.example.com/d/"));

        let parsed = PairingLink::parse(&url).unwrap();
        let joined = SessionConfig::from_link(&parsed).unwrap();
        assert_eq!(joined.relay_url, config.relay_url);
        assert_eq!(joined.token, config.token);
        assert_eq!(joined.key, config.key);
    }

    #[test]
    fn from_link_rejects_bad_key() {
        let token = Token::generate().unwrap();
        let link = PairingLink::new("ws://localhost:1", Role::Accept, token, "not-a-key").unwrap();
        assert!(matches!(
            SessionConfig::from_link(&link),
            Err(TransferError::InvalidKey(_))
        ));
    }
}
