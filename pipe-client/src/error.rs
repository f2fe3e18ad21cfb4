//! Transfer errors.
//!
//! Every failure crosses the [`Sender`](crate::Sender) /
//! [`Receiver`](crate::Receiver) boundary as a [`TransferError`] carrying
//! enough context (sequence numbers, byte counts, paths) for a precise
//! user-facing message. Nothing in this crate retries.

use std::path::PathBuf;
use std::time::Duration;

use pipe_core::NameError;
use pipe_types::FrameKind;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::transport::TransportError;

/// Errors returned by sessions and the transfer engine.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The OS random source failed while generating a token or key.
    #[error("entropy source failed: {0}")]
    EntropyFailure(String),

    /// The relay channel could not be opened.
    #[error("could not connect to relay: {0}")]
    ConnectFailed(String),

    /// The relay refused the join.
    #[error("relay rejected the session: {0}")]
    HandshakeRejected(String),

    /// No peer arrived in time.
    #[error("no peer joined within {waited:?}")]
    Timeout {
        /// How long the session waited.
        waited: Duration,
    },

    /// The channel dropped or the peer left mid-session.
    #[error("connection lost after {bytes_transferred} bytes (next chunk {sequence}): {reason}")]
    ConnectionLost {
        /// Next chunk sequence that would have been sent or received.
        sequence: u64,
        /// Plaintext bytes transferred before the loss.
        bytes_transferred: u64,
        /// What happened.
        reason: String,
    },

    /// A chunk arrived out of order.
    #[error("sequence gap: expected chunk {expected}, got {actual}")]
    SequenceGap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        actual: u64,
    },

    /// A sealed frame failed to authenticate.
    #[error("authentication failed for {kind:?} frame {sequence}")]
    AuthenticationFailed {
        /// Kind of the frame that failed.
        kind: FrameKind,
        /// Its sequence number.
        sequence: u64,
    },

    /// The channel closed cleanly before the end-of-stream marker.
    #[error("incomplete transfer: received {received} of {expected} bytes into {path:?}")]
    IncompleteTransfer {
        /// Partially written destination file (left in place).
        path: PathBuf,
        /// Bytes written.
        received: u64,
        /// Bytes announced in the metadata.
        expected: u64,
    },

    /// The sender announced a file name that is not a plain file name.
    #[error("refusing unsafe file name: {0}")]
    UnsafeFileName(#[from] NameError),

    /// Every collision candidate for the file name is taken.
    #[error("no free destination name for {name:?} in {dir:?}")]
    DestinationExists {
        /// Destination directory.
        dir: PathBuf,
        /// Announced file name.
        name: String,
    },

    /// The session key text in a link or config is malformed.
    #[error("invalid session key: {0}")]
    InvalidKey(String),

    /// A frame was malformed or arrived where it is not allowed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local file I/O failed.
    #[error("file error on {path:?}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The operation needs an open relay channel.
    #[error("not connected")]
    NotConnected,
}

impl TransferError {
    /// Whether this error indicates tampering; partial output is discarded.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            TransferError::SequenceGap { .. }
                | TransferError::AuthenticationFailed { .. }
                | TransferError::Protocol(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<CryptoError> for TransferError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::EntropyFailure(msg) => TransferError::EntropyFailure(msg),
            CryptoError::InvalidEncoding(msg) => TransferError::InvalidKey(msg),
            other => TransferError::Protocol(other.to_string()),
        }
    }
}

impl From<TransportError> for TransferError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::ConnectionFailed(msg) => TransferError::ConnectFailed(msg),
            TransportError::Timeout => {
                TransferError::ConnectFailed("timed out joining relay".into())
            }
            TransportError::Rejected(msg) => TransferError::HandshakeRejected(msg),
            TransportError::NotConnected => TransferError::NotConnected,
            TransportError::Protocol(msg) => TransferError::Protocol(msg),
            other => TransferError::ConnectionLost {
                sequence: 0,
                bytes_transferred: 0,
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_events() {
        assert!(TransferError::SequenceGap {
            expected: 1,
            actual: 3
        }
        .is_security_event());
        assert!(TransferError::AuthenticationFailed {
            kind: FrameKind::Chunk,
            sequence: 2
        }
        .is_security_event());
        assert!(!TransferError::IncompleteTransfer {
            path: PathBuf::from("x"),
            received: 1,
            expected: 2
        }
        .is_security_event());
        assert!(!TransferError::Timeout {
            waited: Duration::ZERO
        }
        .is_security_event());
    }

    #[test]
    fn transport_errors_map_by_kind() {
        assert!(matches!(
            TransferError::from(TransportError::Rejected("role taken".into())),
            TransferError::HandshakeRejected(_)
        ));
        assert!(matches!(
            TransferError::from(TransportError::ConnectionFailed("refused".into())),
            TransferError::ConnectFailed(_)
        ));
        assert!(matches!(
            TransferError::from(TransportError::ConnectionClosed),
            TransferError::ConnectionLost { .. }
        ));
    }

    #[test]
    fn crypto_errors_map_by_kind() {
        assert!(matches!(
            TransferError::from(CryptoError::EntropyFailure("no rng".into())),
            TransferError::EntropyFailure(_)
        ));
        assert!(matches!(
            TransferError::from(CryptoError::InvalidEncoding("bad".into())),
            TransferError::InvalidKey(_)
        ));
    }

    #[test]
    fn messages_carry_context() {
        let err = TransferError::ConnectionLost {
            sequence: 7,
            bytes_transferred: 1792,
            reason: "peer left".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("1792"));
        assert!(msg.contains("7"));
        assert!(msg.contains("peer left"));
    }
}
