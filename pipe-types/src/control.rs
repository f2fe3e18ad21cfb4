//! Relay control protocol.
//!
//! Control signals travel as JSON text frames so that browser peers can
//! speak the protocol without a MessagePack decoder. The client only ever
//! sends [`ControlMessage::Join`]; everything else flows relay → client.

use serde::{Deserialize, Serialize};

use crate::{Role, Token, TypesError};

/// A relay control signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Client announces its rendezvous slot and role.
    Join {
        /// Rendezvous token
        token: Token,
        /// Role taken by this connection
        role: Role,
    },
    /// Relay accepted the join; the peer has not arrived yet.
    Waiting,
    /// Both roles for the token are present.
    PeerJoined,
    /// The paired peer disconnected.
    PeerLeft,
    /// Relay rejected a request.
    Error {
        /// Human-readable reason
        message: String,
    },
}

impl ControlMessage {
    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, TypesError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self, TypesError> {
        Ok(serde_json::from_str(text)?)
    }
}
