//! In-memory server wrapper for deterministic tests.
//!
//! `SimServer` wraps `ServerDriver` with `SimEnv` and stands in for the
//! network: every frame a session would receive lands in that session's
//! inbox, already decoded. Tests drive the server explicitly, one event at a
//! time, and inspect inboxes afterwards.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use bytes::Bytes;
use roomcast_proto::{ClientFrame, ServerFrame};
use roomcast_server::{DriverConfig, DriverError, LogLevel, ServerAction, ServerDriver, ServerEvent};

use crate::sim_env::{SimEnv, SimInstant};

/// Per-session view of the simulated network.
#[derive(Debug, Default)]
struct SimConnection {
    /// Frames delivered and not yet drained
    inbox: Vec<ServerFrame>,
    /// Set once the server closed the connection or the client left
    closed: Option<String>,
}

/// Simulation server for tests.
///
/// Session IDs are handed out sequentially from 1.
pub struct SimServer {
    /// The action-based server driver
    driver: ServerDriver<SimEnv>,
    /// Handle on the driver's clock
    env: SimEnv,
    /// Connection state (`session_id` → state)
    connections: BTreeMap<u64, SimConnection>,
    /// Next connection ID
    next_session_id: u64,
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimServer {
    /// Create a server with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DriverConfig::default())
    }

    /// Create a server with a custom configuration.
    pub fn with_config(config: DriverConfig) -> Self {
        let env = SimEnv::new();
        let driver = ServerDriver::new(env.clone(), config);
        Self { driver, env, connections: BTreeMap::new(), next_session_id: 1 }
    }

    /// Open a new connection and return its session ID.
    pub fn connect(&mut self) -> Result<u64, DriverError> {
        let session_id = self.next_session_id;
        self.next_session_id += 1;

        self.connections.insert(session_id, SimConnection::default());
        self.process(ServerEvent::ConnectionAccepted { session_id })?;
        Ok(session_id)
    }

    /// Open a connection and register it under `username`.
    ///
    /// The welcome frame (or error) stays in the inbox.
    pub fn connect_as(&mut self, username: &str) -> Result<u64, DriverError> {
        let session_id = self.connect()?;
        self.send(session_id, &ClientFrame::Register { username: username.to_string() })?;
        Ok(session_id)
    }

    /// Send a client frame as JSON text.
    pub fn send(&mut self, session_id: u64, frame: &ClientFrame) -> Result<(), DriverError> {
        let text = frame.encode()?;
        self.send_raw(session_id, text.as_bytes())
    }

    /// Send arbitrary bytes as one message.
    pub fn send_raw(&mut self, session_id: u64, payload: &[u8]) -> Result<(), DriverError> {
        self.process(ServerEvent::FrameReceived {
            session_id,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// Deliver a transport-level ping from the client.
    pub fn heartbeat(&mut self, session_id: u64) -> Result<(), DriverError> {
        self.process(ServerEvent::HeartbeatReceived { session_id })
    }

    /// Client-side disconnect.
    pub fn disconnect(&mut self, session_id: u64) -> Result<(), DriverError> {
        if let Some(conn) = self.connections.get_mut(&session_id) {
            conn.closed.get_or_insert_with(|| "client disconnect".to_string());
        }

        self.process(ServerEvent::ConnectionClosed {
            session_id,
            reason: "client disconnect".to_string(),
        })
    }

    /// Run one heartbeat sweep.
    pub fn tick(&mut self) -> Result<(), DriverError> {
        self.process(ServerEvent::Tick)
    }

    /// Move the virtual clock forward without sweeping.
    pub fn advance(&self, duration: Duration) {
        self.env.advance(duration);
    }

    /// Frames waiting in a session's inbox.
    pub fn inbox(&self, session_id: u64) -> &[ServerFrame] {
        self.connections.get(&session_id).map(|conn| conn.inbox.as_slice()).unwrap_or(&[])
    }

    /// Take every frame from a session's inbox.
    pub fn drain(&mut self, session_id: u64) -> Vec<ServerFrame> {
        self.connections
            .get_mut(&session_id)
            .map(|conn| std::mem::take(&mut conn.inbox))
            .unwrap_or_default()
    }

    /// Empty every inbox.
    pub fn drain_all(&mut self) -> HashMap<u64, Vec<ServerFrame>> {
        self.connections
            .iter_mut()
            .map(|(&session_id, conn)| (session_id, std::mem::take(&mut conn.inbox)))
            .collect()
    }

    /// Whether the connection has been closed by either side.
    pub fn is_closed(&self, session_id: u64) -> bool {
        self.close_reason(session_id).is_some()
    }

    /// Why the connection was closed.
    pub fn close_reason(&self, session_id: u64) -> Option<&str> {
        self.connections.get(&session_id).and_then(|conn| conn.closed.as_deref())
    }

    /// Session IDs of connections that are still open.
    pub fn open_sessions(&self) -> Vec<u64> {
        self.connections
            .iter()
            .filter(|(_, conn)| conn.closed.is_none())
            .map(|(&session_id, _)| session_id)
            .collect()
    }

    /// The wrapped driver.
    pub fn driver(&self) -> &ServerDriver<SimEnv> {
        &self.driver
    }

    /// Handle on the virtual clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    fn process(&mut self, event: ServerEvent) -> Result<(), DriverError> {
        let actions = self.driver.process_event(event)?;
        self.execute_actions(actions)
    }

    /// Execute server actions.
    fn execute_actions(
        &mut self,
        actions: Vec<ServerAction<SimInstant>>,
    ) -> Result<(), DriverError> {
        for action in actions {
            match action {
                ServerAction::SendToSession { session_id, frame } => {
                    self.deliver(session_id, frame);
                },

                ServerAction::Broadcast { recipients, frame } => {
                    for session_id in recipients {
                        self.deliver(session_id, frame.clone());
                    }
                },

                ServerAction::CloseConnection { session_id, reason } => {
                    self.close_connection(session_id, reason)?;
                },

                ServerAction::Log { level, message, timestamp } => {
                    let at = timestamp.since_start();
                    match level {
                        LogLevel::Debug => tracing::debug!(?at, "{}", message),
                        LogLevel::Info => tracing::info!(?at, "{}", message),
                        LogLevel::Warn => tracing::warn!(?at, "{}", message),
                        LogLevel::Error => tracing::error!(?at, "{}", message),
                    }
                },
            }
        }

        Ok(())
    }

    fn deliver(&mut self, session_id: u64, frame: ServerFrame) {
        if let Some(conn) = self.connections.get_mut(&session_id)
            && conn.closed.is_none()
        {
            conn.inbox.push(frame);
        }
    }

    /// Server-side close. Mirrors the runtime: the socket goes away, then the
    /// driver hears about it.
    fn close_connection(&mut self, session_id: u64, reason: String) -> Result<(), DriverError> {
        let Some(conn) = self.connections.get_mut(&session_id) else {
            return Ok(());
        };
        if conn.closed.is_some() {
            return Ok(());
        }
        conn.closed = Some(reason.clone());

        self.process(ServerEvent::ConnectionClosed { session_id, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_are_numbered_from_one() {
        let mut server = SimServer::new();
        assert_eq!(server.connect().unwrap(), 1);
        assert_eq!(server.connect().unwrap(), 2);
        assert_eq!(server.open_sessions(), vec![1, 2]);
    }

    #[test]
    fn closed_sessions_receive_nothing() {
        let mut server = SimServer::new();
        let ali = server.connect_as("Ali").unwrap();
        let bea = server.connect_as("Bea").unwrap();
        server.drain_all();

        server.disconnect(bea).unwrap();
        server.send(ali, &ClientFrame::Chat { content: "anyone?".to_string() }).unwrap();

        assert!(server.inbox(bea).is_empty());
        assert_eq!(server.inbox(ali).len(), 1);
        assert_eq!(server.close_reason(bea), Some("client disconnect"));
    }

    #[test]
    fn max_connections_closes_the_newcomer() {
        let config = DriverConfig { max_connections: 1, ..DriverConfig::default() };
        let mut server = SimServer::with_config(config);

        let first = server.connect().unwrap();
        let second = server.connect().unwrap();

        assert!(!server.is_closed(first));
        assert_eq!(server.close_reason(second), Some("max connections exceeded"));
        assert_eq!(server.driver().connection_count(), 1);
    }
}
