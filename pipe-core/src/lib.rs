//! # pipe-core
//!
//! Pure logic for AirPipe (no I/O, instant tests).
//!
//! This crate implements the state machines and policies for a transfer
//! session without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`handshake`]: the rendezvous state machine shared by both roles
//! - [`pairing`]: building and parsing pairing links
//! - [`naming`]: received file name validation and collision policy
//! - [`sequence`]: chunk sequence tracking and chunk arithmetic
//!
//! The actual I/O (relay channel, files) is performed by `pipe-client`, which
//! interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod handshake;
pub mod naming;
pub mod pairing;
pub mod sequence;

pub use handshake::{Action, Event, HandshakeState};
pub use naming::{
    candidate_name, sanitize_file_name, validate_file_name, NameError, MAX_COLLISION_ATTEMPTS,
    MAX_NAME_LEN,
};
pub use pairing::{PairingError, PairingLink};
pub use sequence::{chunk_count, SequenceGap, SequenceTracker};
