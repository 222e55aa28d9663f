//! Driver error types.
//!
//! Provides strongly-typed errors for relay operations:
//! - Session management (accept, lookup)
//! - Client rule violations (see [`ChatError`])
//! - Frame encoding

use std::fmt;

use roomcast_core::ChatError;

/// Errors that can occur while the driver processes an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Session not found in registry.
    ///
    /// Occurs when an event names a session that was never accepted or has
    /// already been unregistered. Usually a late event for a closed
    /// connection.
    SessionNotFound(u64),

    /// Session already registered.
    ///
    /// Attempting to accept a session ID that already exists. This is a logic
    /// bug - session IDs are unique for the process lifetime.
    SessionAlreadyExists(u64),

    /// The client broke a protocol rule.
    ///
    /// Reported back to the client as an `error` frame. Never affects other
    /// sessions.
    Chat(ChatError),

    /// Frame encoding error.
    Protocol(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::SessionAlreadyExists(id) => write!(f, "session already exists: {id}"),
            Self::Chat(err) => write!(f, "rejected: {err}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Chat(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChatError> for DriverError {
    fn from(err: ChatError) -> Self {
        Self::Chat(err)
    }
}

impl From<roomcast_proto::ProtocolError> for DriverError {
    fn from(err: roomcast_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
