//! End-to-end transfer frames.
//!
//! Payload frames travel as binary WebSocket messages and are forwarded by
//! the relay verbatim. Every frame body is sealed under the session key, so
//! the relay sees only the frame kind, a sequence number and ciphertext.
//!
//! Wire layout (big-endian):
//!
//! ```text
//! version (1) || kind (1) || sequence (8) || sealed body
//! ```
//!
//! The WebSocket message boundary delimits the frame.

use serde::{Deserialize, Serialize};

use crate::TypesError;

/// Current payload wire version.
pub const WIRE_VERSION: u8 = 1;

/// Size of the fixed frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 10;

/// Payload frame discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Sealed [`TransferMetadata`], always first.
    Metadata = 1,
    /// Sealed file bytes.
    Chunk = 2,
    /// Sealed [`EndOfStream`], always last.
    End = 3,
}

impl FrameKind {
    /// Parse the wire discriminator.
    pub fn from_u8(value: u8) -> Result<Self, TypesError> {
        match value {
            1 => Ok(FrameKind::Metadata),
            2 => Ok(FrameKind::Chunk),
            3 => Ok(FrameKind::End),
            other => Err(TypesError::InvalidFrame(format!("unknown frame kind {other}"))),
        }
    }
}

/// A single end-to-end transfer frame.
#[derive(Clone, PartialEq, Eq)]
pub struct PayloadFrame {
    /// Frame discriminator
    pub kind: FrameKind,
    /// Chunk sequence number; for `End` the number of chunks sent; 0 for `Metadata`
    pub sequence: u64,
    /// Ciphertext plus authentication tag
    pub sealed: Vec<u8>,
}

impl PayloadFrame {
    /// Build a metadata frame.
    pub fn metadata(sealed: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Metadata,
            sequence: 0,
            sealed,
        }
    }

    /// Build a chunk frame.
    pub fn chunk(sequence: u64, sealed: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Chunk,
            sequence,
            sealed,
        }
    }

    /// Build an end-of-stream frame.
    pub fn end(chunks: u64, sealed: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::End,
            sequence: chunks,
            sealed,
        }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_HEADER_SIZE + self.sealed.len());
        bytes.push(WIRE_VERSION);
        bytes.push(self.kind as u8);
        bytes.extend_from_slice(&self.sequence.to_be_bytes());
        bytes.extend_from_slice(&self.sealed);
        bytes
    }

    /// Decode from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, TypesError> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(TypesError::InvalidFrame(format!(
                "frame too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != WIRE_VERSION {
            return Err(TypesError::UnsupportedVersion(bytes[0]));
        }
        let kind = FrameKind::from_u8(bytes[1])?;
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&bytes[2..FRAME_HEADER_SIZE]);

        Ok(Self {
            kind,
            sequence: u64::from_be_bytes(seq),
            sealed: bytes[FRAME_HEADER_SIZE..].to_vec(),
        })
    }
}

// Ciphertext is noise; print its length only.
impl std::fmt::Debug for PayloadFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadFrame")
            .field("kind", &self.kind)
            .field("sequence", &self.sequence)
            .field("sealed", &format!("[{} bytes]", self.sealed.len()))
            .finish()
    }
}

/// Description of the file being transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    /// Base file name, no directory components
    pub name: String,
    /// Total size in bytes
    pub size: u64,
}

impl TransferMetadata {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypesError> {
        rmp_serde::to_vec(self).map_err(TypesError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        rmp_serde::from_slice(bytes).map_err(TypesError::Deserialization)
    }
}

/// Trailer confirming how much was sent.
///
/// Sealed so that a relay cannot truncate the stream by forging an end marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndOfStream {
    /// Number of chunk frames sent
    pub chunks: u64,
    /// Number of plaintext bytes sent
    pub bytes: u64,
}

impl EndOfStream {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypesError> {
        rmp_serde::to_vec(self).map_err(TypesError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        rmp_serde::from_slice(bytes).map_err(TypesError::Deserialization)
    }
}
