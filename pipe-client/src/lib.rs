//! # pipe-client
//!
//! Sender and receiver sessions for the AirPipe file transfer protocol.
//!
//! Two parties exchange a file through an untrusted relay. The relay pairs
//! them by a random token and forwards opaque frames; the symmetric key
//! travels only in the pairing link fragment and never reaches the relay.
//!
//! ## Features
//!
//! - **E2E Encryption**: XChaCha20-Poly1305 per chunk, nonces derived from
//!   the chunk position, associated data binding role, frame kind and sequence
//! - **Bounded Memory**: files stream in fixed-size chunks
//! - **Tamper Detection**: gaps, replays and forged end markers are fatal
//! - **Transport Abstraction**: WebSocket relay channel, mock for testing
//! - **Pure State Machine**: uses pipe-core for the rendezvous handshake
//!
//! ## Example
//!
//! ```ignore
//! use pipe_client::{Sender, SessionConfig};
//!
//! let config = SessionConfig::generate("wss://relay.example.com")?;
//! println!("{}", config.pairing_link(Role::Offer)?.to_url()?);
//!
//! let mut sender = Sender::new(config);
//! sender.connect().await?;
//! sender.wait_for_peer(Duration::from_secs(300)).await?;
//! sender.send_file(Path::new("photo.jpg"), |sent, total| {
//!     println!("{sent}/{total}");
//! }).await?;
//! sender.close().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod session;
pub mod transport;

pub use config::{
    SessionConfig, DEFAULT_CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PEER_TIMEOUT,
    DEFAULT_RELAY, DEFAULT_WRITE_TIMEOUT, MAX_CHUNK_SIZE,
};
pub use crypto::{CryptoError, FrameAad, SessionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use engine::TransferSummary;
pub use error::TransferError;
pub use handshake::Coordinator;
pub use session::{Receiver, Sender};
pub use transport::{
    ChannelFrame, JoinStatus, MockTransport, RelayEndpoint, Transport, TransportError,
    WebSocketTransport,
};
