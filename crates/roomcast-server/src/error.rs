//! Runtime error types.

use std::fmt;

/// Errors that stop the server from starting or serving.
///
/// Per-connection failures never surface here; they end the affected
/// connection and are logged.
#[derive(Debug)]
pub enum ServerError {
    /// Bad bind address, zero sweep interval, zero queue capacity.
    Config(String),

    /// Socket-level failure: bind, accept, local address, handshake.
    Transport(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ServerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(format!("websocket: {err}"))
    }
}
