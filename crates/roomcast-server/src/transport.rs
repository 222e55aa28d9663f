//! WebSocket transport over TCP.
//!
//! Accepting a TCP connection and upgrading it are split so the accept loop
//! never waits on a client's handshake: [`WsTransport::accept`] returns the
//! raw stream and [`upgrade`] runs inside the per-connection task.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::protocol::WebSocketConfig,
};

use crate::error::ServerError;

/// Listening WebSocket endpoint.
pub struct WsTransport {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl WsTransport {
    /// Bind a TCP listener.
    ///
    /// `max_message_bytes` caps every inbound WebSocket message; larger ones
    /// fail the connection at the protocol layer.
    pub async fn bind(address: &str, max_message_bytes: usize) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        let config = WebSocketConfig::default()
            .max_message_size(Some(max_message_bytes))
            .max_frame_size(Some(max_message_bytes));

        tracing::info!("WebSocket transport bound to {}", addr);

        Ok(Self { listener, config })
    }

    /// Accept a new TCP connection.
    ///
    /// This method blocks until a connection is available.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        self.listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))
    }

    /// Handshake configuration for [`upgrade`].
    pub fn websocket_config(&self) -> WebSocketConfig {
        self.config
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// Run the WebSocket handshake on an accepted stream.
pub async fn upgrade(
    stream: TcpStream,
    config: WebSocketConfig,
) -> Result<WebSocketStream<TcpStream>, ServerError> {
    Ok(tokio_tungstenite::accept_async_with_config(stream, Some(config)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_rejects_bad_address() {
        let result = WsTransport::bind("not-an-address", 1024).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn bind_ephemeral_port() {
        let transport = WsTransport::bind("127.0.0.1:0", 1024).await.unwrap();
        let addr = transport.local_addr().unwrap();

        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }
}
