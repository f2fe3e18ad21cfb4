//! # pipe-types
//!
//! Wire format types for the AirPipe file transfer protocol.
//!
//! This crate provides the foundational types shared by the client, the
//! relay and the CLI:
//! - [`Token`], [`Role`] - Rendezvous identity
//! - [`ControlMessage`] - Relay control signals (JSON text frames)
//! - [`PayloadFrame`] - End-to-end transfer frames (binary, opaque to the relay)
//! - [`TransferMetadata`], [`EndOfStream`] - Sealed frame bodies
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod control;
mod error;
mod payload;
mod token;

pub use control::ControlMessage;
pub use error::TypesError;
pub use payload::{
    EndOfStream, FrameKind, PayloadFrame, TransferMetadata, FRAME_HEADER_SIZE, WIRE_VERSION,
};
pub use token::{Role, Token, TOKEN_BYTES};
