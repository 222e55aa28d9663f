//! Error taxonomy for client-visible failures.
//!
//! Every variant except [`ChatError::TransportFailure`] is reported back to the
//! offending connection as an `error` frame and leaves the connection open.
//! Transport failures are raised by the runtime when a socket read or write
//! fails; they end that one connection and become its close reason.

use roomcast_proto::ProtocolError;
use thiserror::Error;

/// Errors a single connection can cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Display name is empty, too short or too long after trimming
    #[error("username must be between {min} and {max} characters")]
    NameInvalid {
        /// Minimum length in characters
        min: usize,
        /// Maximum length in characters
        max: usize,
    },

    /// Room name is empty, too short or too long after trimming
    #[error("room name must be between {min} and {max} characters")]
    RoomNameInvalid {
        /// Minimum length in characters
        min: usize,
        /// Maximum length in characters
        max: usize,
    },

    /// Action needs a registered connection
    #[error("register before sending {action}")]
    NotRegistered {
        /// Frame type that was attempted
        action: &'static str,
    },

    /// `register` sent twice on one connection
    #[error("already registered")]
    AlreadyRegistered,

    /// Chat content is empty or whitespace
    #[error("message must not be empty")]
    EmptyMessage,

    /// Chat content exceeds the size limit
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Size of the rejected content
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Frame could not be parsed or has an unknown type
    #[error("unknown or malformed frame")]
    MalformedFrame,

    /// Send or receive failed on this connection's transport
    #[error("transport failure: {0}")]
    TransportFailure(String),
}

/// Any decode failure is reported to the client the same way; the detail only
/// goes to the server log.
impl From<ProtocolError> for ChatError {
    fn from(_: ProtocolError) -> Self {
        Self::MalformedFrame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failure_carries_the_cause() {
        let err = ChatError::TransportFailure("reset by peer".to_string());
        assert_eq!(err.to_string(), "transport failure: reset by peer");
    }

    #[test]
    fn malformed_frame_message_is_stable() {
        // Clients match on this text
        assert_eq!(ChatError::MalformedFrame.to_string(), roomcast_proto::MALFORMED_FRAME_MESSAGE);
    }

    #[test]
    fn protocol_errors_become_malformed_frame() {
        let err: ChatError = ProtocolError::Malformed("expected value".to_string()).into();
        assert_eq!(err, ChatError::MalformedFrame);

        let err: ChatError = ProtocolError::FrameTooLarge { size: 20_000, max: 16_384 }.into();
        assert_eq!(err, ChatError::MalformedFrame);
    }

    #[test]
    fn not_registered_names_the_action() {
        let err = ChatError::NotRegistered { action: "chat" };
        assert_eq!(err.to_string(), "register before sending chat");
    }
}
