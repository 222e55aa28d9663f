//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while decoding or encoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Inbound frame exceeds [`crate::MAX_FRAME_BYTES`]
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the rejected frame
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Frame is not valid JSON, has an unknown `type`, or is missing fields
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Outbound frame could not be serialized
    #[error("failed to encode frame: {0}")]
    Encode(String),
}
