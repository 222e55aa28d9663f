//! Roomcast wire protocol.
//!
//! Frames are UTF-8 JSON objects, one per WebSocket message, discriminated by
//! a snake_case `type` field. Clients send [`ClientFrame`]s and the relay
//! answers with [`ServerFrame`]s. Unknown extra fields on inbound frames are
//! ignored so older servers tolerate newer clients.
//!
//! # Invariants
//!
//! - Decoding never panics: any input either yields a frame or a
//!   [`ProtocolError`].
//! - Inbound frames larger than [`MAX_FRAME_BYTES`] are rejected before
//!   parsing.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod frame;

pub use errors::{ProtocolError, Result};
pub use frame::{ClientFrame, RoomEntry, ServerFrame, UserEntry};

/// Largest inbound frame the relay will attempt to parse, in bytes.
///
/// Chat content itself is capped lower by the server's message limits; this
/// bound only protects the JSON parser.
pub const MAX_FRAME_BYTES: usize = 16 * 1024;

/// Message sent to clients for any frame that cannot be understood.
pub const MALFORMED_FRAME_MESSAGE: &str = "unknown or malformed frame";
