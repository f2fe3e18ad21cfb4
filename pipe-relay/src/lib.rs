//! # pipe-relay
//!
//! Pairing relay for AirPipe.
//!
//! This crate implements a relay server that:
//! - Accepts WebSocket connections on `/ws`
//! - Matches exactly one sender and one receiver per token
//! - Forwards binary frames between the pair without decoding them
//! - Tells each side when its partner arrives or leaves
//! - Never sees the session key (it lives in the link fragment)
//!
//! ## Architecture
//!
//! ```text
//! Sender ──┐                      ┌── Receiver
//!          │   WebSocket /ws      │
//!          ├─────────────────────►│
//!      ┌───┴──────────────────────┴───┐
//!      │         pipe-relay           │
//!      │  slots: token → {offer,      │
//!      │                  accept}     │
//!      └──────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Control messages are JSON text frames:
//! - `join` → `waiting` or `peer-joined`
//! - `peer-joined` when the second role arrives
//! - `peer-left` when the partner disconnects
//! - `error` on rejection, followed by close
//!
//! Binary frames are forwarded verbatim and in order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, LimitsConfig, ServerConfig};
pub use error::{RelayError, Result};
pub use server::{serve, JoinOutcome, Outbound, PeerHandle, PipeRelay, RelayMetrics, WEBSOCKET_PATH};
pub use session::{Session, SessionState};
