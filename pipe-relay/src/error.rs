//! Error types for airpipe-relay.

use pipe_types::Role;

/// Main error type for relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The slot already has a connection in this role.
    #[error("{role} role already taken for this token")]
    RoleTaken {
        /// The contested role.
        role: Role,
    },

    /// Too many slots are waiting for a peer.
    #[error("relay is at capacity ({limit} waiting sessions)")]
    AtCapacity {
        /// Configured limit.
        limit: usize,
    },

    /// WebSocket upgrade failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// Client spoke out of turn.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// WebSocket read or write failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
