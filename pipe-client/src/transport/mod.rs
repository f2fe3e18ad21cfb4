//! Relay channel abstraction for AirPipe.
//!
//! This module provides a pluggable transport layer that abstracts
//! the underlying connection mechanism (WebSocket relay, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` opens the channel and joins the rendezvous slot
//! - `send()` transmits a control or payload frame
//! - `recv()` receives the next frame
//! - `close()` terminates and unblocks pending reads
//!
//! Frames keep their boundaries: control signals are text messages and
//! payload frames are binary messages.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! let status = transport.connect(&endpoint).await?;
//! transport.send(ChannelFrame::Payload(bytes)).await?;
//! let frame = transport.recv().await?;
//! ```

mod mock;
mod websocket;

pub use mock::MockTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use pipe_types::{ControlMessage, Role, Token};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The relay refused the join.
    #[error("relay rejected join: {0}")]
    Rejected(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,

    /// The relay sent something that is not a valid frame.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// One message on the relay channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFrame {
    /// Relay control signal (text).
    Control(ControlMessage),
    /// Encoded end-to-end payload frame (binary), opaque to the relay.
    Payload(Vec<u8>),
}

/// Where and as whom to join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    /// Relay base address (`ws://` or `wss://`).
    pub relay: String,
    /// Rendezvous token.
    pub token: Token,
    /// Role this connection takes.
    pub role: Role,
}

impl RelayEndpoint {
    /// Create an endpoint.
    pub fn new(relay: &str, token: Token, role: Role) -> Self {
        Self {
            relay: relay.trim_end_matches('/').to_string(),
            token,
            role,
        }
    }

    /// The relay's WebSocket URL.
    pub fn websocket_url(&self) -> String {
        format!("{}/ws", self.relay)
    }

    /// The join announcement; the only thing the relay learns about the session.
    pub fn join_message(&self) -> ControlMessage {
        ControlMessage::Join {
            token: self.token,
            role: self.role,
        }
    }
}

/// Relay acknowledgement of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    /// Joined; the peer has not arrived yet.
    Waiting,
    /// Joined and the peer was already present.
    PeerPresent,
}

/// Transport trait for the relay channel.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the channel, announce `{token, role}` and wait for the relay's
    /// acknowledgement.
    async fn connect(&self, endpoint: &RelayEndpoint) -> Result<JoinStatus, TransportError>;

    /// Send one frame.
    async fn send(&self, frame: ChannelFrame) -> Result<(), TransportError>;

    /// Receive the next frame.
    ///
    /// Blocks until a frame is available or the channel closes.
    async fn recv(&self) -> Result<ChannelFrame, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the channel. Idempotent and safe after errors.
    async fn close(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_appends_path() {
        let token = Token::from_bytes([1; 16]);
        let endpoint = RelayEndpoint::new("wss://relay.example.com/", token, Role::Offer);
        assert_eq!(endpoint.websocket_url(), "wss://relay.example.com/ws");
    }

    #[test]
    fn join_message_has_token_and_role_only() {
        let token = Token::from_bytes([2; 16]);
        let endpoint = RelayEndpoint::new("ws://localhost:8080", token, Role::Accept);
        let json = endpoint.join_message().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(object["type"], "join");
        assert_eq!(object["role"], "accept");
        assert_eq!(object["token"], token.to_string());
    }
}
