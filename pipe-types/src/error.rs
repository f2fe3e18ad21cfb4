//! Error types for AirPipe wire types.

use thiserror::Error;

/// Errors that can occur while building or parsing wire types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Control message JSON was malformed
    #[error("invalid control message: {0}")]
    Json(#[from] serde_json::Error),

    /// Token text was not 32 hex characters
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Role path segment was neither `d` nor `u`
    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// Payload frame was truncated or carried an unknown kind
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Payload frame was produced by an incompatible peer
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    /// The OS random source failed
    #[error("entropy source failed: {0}")]
    Entropy(String),
}
