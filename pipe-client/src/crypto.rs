//! Cryptographic primitives for AirPipe.
//!
//! This module provides:
//! - Random 256-bit session keys with URL-fragment-safe text encoding
//! - XChaCha20-Poly1305 sealing of frame bodies
//! - Deterministic nonces derived from each frame's position in the stream
//!
//! # Security Notes
//!
//! - Every session uses a fresh key, and within a session each
//!   (sealing role, frame kind, sequence) triple is sealed once, so derived
//!   nonces never repeat under a key
//! - The same triple is bound as associated data, so a frame moved to another
//!   position, another stream direction or another frame kind fails to open
//! - Opening fails closed: any corruption yields `AuthenticationFailed`

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use pipe_types::{FrameKind, Role};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Nonce size for XChaCha20-Poly1305 (192 bits = 24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Key size for XChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Domain separation prefix for associated data.
const AAD_DOMAIN: &[u8] = b"airpipe-v1";

/// Crypto errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The OS random source failed.
    #[error("entropy source failed: {0}")]
    EntropyFailure(String),

    /// Key text is not valid URL-safe base64 of the right length.
    #[error("invalid key encoding: {0}")]
    InvalidEncoding(String),

    /// Encryption failed.
    #[error("encryption failed")]
    SealFailed,

    /// Decryption failed (authentication error).
    #[error("authentication failed")]
    AuthenticationFailed,
}

/// Position of a sealed body in the transfer stream.
///
/// Used both as associated data and as the nonce source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAad {
    /// Role of the party that sealed the frame
    pub sealer: Role,
    /// Frame kind
    pub kind: FrameKind,
    /// Chunk sequence (chunk count for `End`, 0 for `Metadata`)
    pub sequence: u64,
}

impl FrameAad {
    /// Create associated data for a frame.
    pub fn new(sealer: Role, kind: FrameKind, sequence: u64) -> Self {
        Self {
            sealer,
            kind,
            sequence,
        }
    }

    fn role_byte(&self) -> u8 {
        match self.sealer {
            Role::Offer => 1,
            Role::Accept => 2,
        }
    }

    /// Nonce layout: role (1) || kind (1) || zero (14) || sequence (8, big-endian).
    fn nonce(&self) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[0] = self.role_byte();
        nonce[1] = self.kind as u8;
        nonce[NONCE_SIZE - 8..].copy_from_slice(&self.sequence.to_be_bytes());
        nonce
    }

    fn to_bytes(self) -> Vec<u8> {
        let mut aad = Vec::with_capacity(AAD_DOMAIN.len() + 10);
        aad.extend_from_slice(AAD_DOMAIN);
        aad.push(self.role_byte());
        aad.push(self.kind as u8);
        aad.extend_from_slice(&self.sequence.to_be_bytes());
        aad
    }
}

/// A symmetric session key shared out-of-band via the pairing link.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Generate a fresh random key.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_SIZE];
        getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::EntropyFailure(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encode as URL-safe base64 without padding (43 characters).
    pub fn to_text(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Decode from the text produced by [`SessionKey::to_text`].
    pub fn from_text(text: &str) -> Result<Self, CryptoError> {
        let mut decoded = URL_SAFE_NO_PAD
            .decode(text.trim())
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidEncoding(format!(
                "expected {} key bytes, got {}",
                KEY_SIZE, len
            )));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }

    /// Seal a frame body.
    ///
    /// Returns ciphertext with the 16-byte tag appended.
    pub fn seal(&self, plaintext: &[u8], aad: &FrameAad) -> Result<Vec<u8>, CryptoError> {
        let cipher =
            XChaCha20Poly1305::new_from_slice(&self.0).map_err(|_| CryptoError::SealFailed)?;
        let nonce = aad.nonce();
        let aad_bytes = aad.to_bytes();

        cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad_bytes,
                },
            )
            .map_err(|_| CryptoError::SealFailed)
    }

    /// Open a sealed frame body.
    pub fn open(&self, sealed: &[u8], aad: &FrameAad) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < TAG_SIZE {
            return Err(CryptoError::AuthenticationFailed);
        }
        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        let nonce = aad.nonce();
        let aad_bytes = aad.to_bytes();

        cipher
            .decrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: sealed,
                    aad: &aad_bytes,
                },
            )
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

// Don't leak keys in debug output
impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionKey([REDACTED])")
    }
}
