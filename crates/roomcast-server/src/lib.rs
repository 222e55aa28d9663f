//! Roomcast production server.
//!
//! Multi-room chat relay over WebSocket, using tokio for the async runtime
//! and tokio-tungstenite for framing.
//!
//! # Architecture
//!
//! The [`ServerDriver`] follows the Sans-IO pattern: it owns all relay state
//! (registry, room directory, presence) and turns [`ServerEvent`]s into
//! [`ServerAction`]s without touching a socket. [`Server`] is the production
//! glue that feeds it events from real connections and executes its actions.
//!
//! Per connection the runtime runs a reader loop and a writer task joined by
//! a bounded [`OutboundQueue`]. Actions are executed while the driver lock is
//! held, which keeps delivery order identical to processing order; because
//! pushing onto a queue never waits, one slow client can't stall the rest.
//!
//! # Components
//!
//! - [`ServerDriver`]: Action-based orchestrator (pure logic, no I/O)
//! - [`ConnectionRegistry`]: session identity and heartbeats
//! - [`RoomDirectory`]: room membership
//! - [`PresenceTracker`]: read-only user and room listings
//! - [`Server`]: Production runtime that executes ServerDriver actions
//! - [`WsTransport`]: WebSocket listener
//! - [`SystemEnv`]: Production environment (real clocks)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod outbound;
mod presence;
mod registry;
mod rooms;
mod server_error;
mod system_env;
mod transport;

use std::{collections::HashMap, future::Future, net::SocketAddr, sync::Arc, time::Duration};

pub use driver::{
    DEFAULT_ROOM, LogLevel, ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent,
};
pub use error::ServerError;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
pub use outbound::{
    DEFAULT_OUTBOUND_CAPACITY, OutboundQueue, Outgoing, PushOutcome, SLOW_CONSUMER_REASON,
    SlowConsumerPolicy,
};
pub use presence::{PresenceTracker, RoomSnapshot, UserPresence};
pub use registry::{ConnectionRegistry, RegisteredSession, Registration, SessionInfo};
use roomcast_core::{ChatError, Environment};
use roomcast_proto::MAX_FRAME_BYTES;
pub use rooms::{JoinOutcome, Member, RoomDirectory};
pub use server_error::DriverError;
pub use system_env::SystemEnv;
use tokio::{
    net::TcpStream,
    sync::{Mutex, RwLock},
};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
pub use transport::WsTransport;

/// Interval between heartbeat sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Largest WebSocket message the transport accepts.
///
/// Kept above [`MAX_FRAME_BYTES`] so a slightly oversize frame reaches the
/// driver and is answered with an `error` frame; only messages beyond this
/// fail the connection.
pub const MAX_WS_MESSAGE_BYTES: usize = 4 * MAX_FRAME_BYTES;

/// Display prefix of [`ChatError::TransportFailure`].
const TRANSPORT_FAILURE_PREFIX: &str = "transport failure";

/// How long a writer gets to flush its close frame before it is aborted.
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type SharedDriver = Arc<Mutex<ServerDriver<SystemEnv>>>;
type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Shared state for all connections.
///
/// Lock order: the driver mutex is always taken before `outbound`, never the
/// other way round.
struct SharedState {
    /// Session ID → outbound queue drained by that session's writer task
    outbound: RwLock<HashMap<u64, Arc<OutboundQueue>>>,
    /// Queue capacity for new sessions
    outbound_capacity: usize,
    /// Overflow policy for new sessions
    slow_consumer: SlowConsumerPolicy,
}

impl SharedState {
    fn new_queue(&self) -> Arc<OutboundQueue> {
        Arc::new(OutboundQueue::new(self.outbound_capacity, self.slow_consumer))
    }
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8765")
    pub bind_address: String,
    /// Frames buffered per connection
    pub outbound_capacity: usize,
    /// What to do when a connection's buffer is full
    pub slow_consumer: SlowConsumerPolicy,
    /// How often to look for expired connections
    pub sweep_interval: Duration,
    /// Driver configuration (timeouts, limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8765".to_string(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            slow_consumer: SlowConsumerPolicy::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            driver: DriverConfig::default(),
        }
    }
}

/// Production Roomcast server.
///
/// Wraps `ServerDriver` with the WebSocket transport and system environment.
pub struct Server {
    /// The action-based server driver
    driver: ServerDriver<SystemEnv>,
    /// Listening socket
    transport: WsTransport,
    /// Environment
    env: SystemEnv,
    /// Shared connection state
    shared: Arc<SharedState>,
    /// Heartbeat sweep period
    sweep_interval: Duration,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.sweep_interval.is_zero() {
            return Err(ServerError::Config("sweep interval must be non-zero".to_string()));
        }
        if config.outbound_capacity == 0 {
            return Err(ServerError::Config("outbound capacity must be non-zero".to_string()));
        }

        let env = SystemEnv::new();
        let driver = ServerDriver::new(env.clone(), config.driver);
        let transport = WsTransport::bind(&config.bind_address, MAX_WS_MESSAGE_BYTES).await?;

        let shared = Arc::new(SharedState {
            outbound: RwLock::new(HashMap::new()),
            outbound_capacity: config.outbound_capacity,
            slow_consumer: config.slow_consumer,
        });

        Ok(Self { driver, transport, env, shared, sweep_interval: config.sweep_interval })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// This method runs until the process is terminated.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server until `shutdown` resolves.
    ///
    /// Stops accepting and stops the heartbeat sweep; established connections
    /// are left to the runtime's shutdown.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let Self { driver, transport, env, shared, sweep_interval } = self;
        let driver: SharedDriver = Arc::new(Mutex::new(driver));

        let sweeper = tokio::spawn(heartbeat_loop(
            Arc::clone(&driver),
            Arc::clone(&shared),
            env,
            sweep_interval,
        ));

        let mut next_session_id: u64 = 0;
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                () = &mut shutdown => break,
                accepted = transport.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    next_session_id += 1;
                    let session_id = next_session_id;
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let ws_config = transport.websocket_config();

                    tokio::spawn(async move {
                        let ws = match crate::transport::upgrade(stream, ws_config).await {
                            Ok(ws) => ws,
                            Err(e) => {
                                tracing::debug!(%peer, "Handshake failed: {}", e);
                                return;
                            },
                        };

                        tracing::debug!(%peer, session_id, "New connection");
                        handle_connection(session_id, ws, driver, shared).await;
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }

        sweeper.abort();
        tracing::info!("Server stopped accepting connections");
        Ok(())
    }
}

/// Periodically tick the driver so expired connections are evicted.
async fn heartbeat_loop(
    driver: SharedDriver,
    shared: Arc<SharedState>,
    env: SystemEnv,
    interval: Duration,
) {
    loop {
        env.sleep(interval).await;
        dispatch(&driver, &shared, ServerEvent::Tick).await;
    }
}

/// Drive one WebSocket connection from accept to cleanup.
async fn handle_connection(
    session_id: u64,
    ws: WebSocketStream<TcpStream>,
    driver: SharedDriver,
    shared: Arc<SharedState>,
) {
    let (sink, mut stream) = ws.split();

    let queue = shared.new_queue();
    shared.outbound.write().await.insert(session_id, Arc::clone(&queue));

    let writer = tokio::spawn(write_loop(session_id, sink, Arc::clone(&queue)));
    let writer_abort = writer.abort_handle();

    dispatch(&driver, &shared, ServerEvent::ConnectionAccepted { session_id }).await;

    let reason = loop {
        let next = tokio::select! {
            () = queue.closed() => {
                break queue.close_reason().unwrap_or_else(|| "closed by server".to_string());
            },
            next = stream.next() => next,
        };

        let event = match next {
            Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                ServerEvent::FrameReceived { session_id, payload: msg.into_data() }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                ServerEvent::HeartbeatReceived { session_id }
            },
            Some(Ok(Message::Close(_))) | None => break "client disconnect".to_string(),
            Some(Ok(Message::Frame(_))) => continue,
            Some(Err(e)) => {
                let failure = ChatError::TransportFailure(e.to_string());
                tracing::debug!(session_id, "Read failed: {}", failure);
                break failure.to_string();
            },
        };

        dispatch(&driver, &shared, event).await;
    };

    queue.close(&reason);
    shared.outbound.write().await.remove(&session_id);

    dispatch(&driver, &shared, ServerEvent::ConnectionClosed { session_id, reason }).await;

    if tokio::time::timeout(WRITER_SHUTDOWN_GRACE, writer).await.is_err() {
        tracing::debug!(session_id, "Writer did not finish in time, aborting");
        writer_abort.abort();
    }
}

/// Drain a session's outbound queue onto its socket.
async fn write_loop(session_id: u64, mut sink: WsSink, queue: Arc<OutboundQueue>) {
    loop {
        match queue.next().await {
            Outgoing::Frame(message) => {
                if let Err(e) = sink.send(message).await {
                    let failure = ChatError::TransportFailure(format!("write failed: {e}"));
                    tracing::debug!(session_id, "{}", failure);
                    queue.close(&failure.to_string());
                    return;
                }
            },
            Outgoing::Close(reason) => {
                let frame = CloseFrame { code: close_code(&reason), reason: reason.into() };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!(session_id, "Close frame not delivered: {}", e);
                }
                return;
            },
        }
    }
}

fn close_code(reason: &str) -> CloseCode {
    if reason == SLOW_CONSUMER_REASON {
        CloseCode::Again
    } else if reason.starts_with(TRANSPORT_FAILURE_PREFIX) {
        CloseCode::Error
    } else if reason.ends_with("disconnect") {
        CloseCode::Normal
    } else {
        CloseCode::Policy
    }
}

/// Feed one event to the driver and execute what comes back.
async fn dispatch(driver: &SharedDriver, shared: &SharedState, event: ServerEvent) {
    let mut driver = driver.lock().await;
    match driver.process_event(event) {
        Ok(actions) => execute_actions(actions, shared).await,
        Err(e) => tracing::warn!("Event processing error: {}", e),
    }
}

/// Execute server actions.
///
/// Called with the driver lock held; only performs non-blocking queue pushes.
async fn execute_actions(actions: Vec<ServerAction>, shared: &SharedState) {
    let outbound = shared.outbound.read().await;

    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, frame } => {
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("Failed to encode {} frame: {}", frame.kind(), e);
                        continue;
                    },
                };

                if let Some(queue) = outbound.get(&session_id) {
                    deliver(session_id, queue, Message::text(text));
                } else {
                    tracing::debug!("SendToSession: session {} not found", session_id);
                }
            },

            ServerAction::Broadcast { recipients, frame } => {
                let message = match frame.encode() {
                    Ok(text) => Message::text(text),
                    Err(e) => {
                        tracing::error!("Failed to encode {} frame: {}", frame.kind(), e);
                        continue;
                    },
                };

                for session_id in recipients {
                    if let Some(queue) = outbound.get(&session_id) {
                        // Text payloads are reference counted
                        deliver(session_id, queue, message.clone());
                    }
                }
            },

            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!("Closing connection {}: {}", session_id, reason);
                if let Some(queue) = outbound.get(&session_id) {
                    queue.close(&reason);
                }
            },

            ServerAction::Log { level, message, .. } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}

fn deliver(session_id: u64, queue: &OutboundQueue, message: Message) {
    match queue.push(message) {
        PushOutcome::Queued | PushOutcome::Closed => {},
        PushOutcome::DroppedOldest => {
            tracing::debug!(session_id, "Outbound queue full, dropped oldest frame");
        },
        PushOutcome::Overflow => {
            tracing::warn!(session_id, "Outbound queue overflow, disconnecting slow consumer");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_close_with_an_error_code() {
        let reason = ChatError::TransportFailure("connection reset".to_string()).to_string();

        assert_eq!(reason, "transport failure: connection reset");
        assert_eq!(close_code(&reason), CloseCode::Error);
    }

    #[test]
    fn close_codes_follow_the_reason() {
        assert_eq!(close_code(SLOW_CONSUMER_REASON), CloseCode::Again);
        assert_eq!(close_code("client disconnect"), CloseCode::Normal);
        assert_eq!(close_code("heartbeat timeout after 61s"), CloseCode::Policy);
        assert_eq!(close_code("max connections exceeded"), CloseCode::Policy);
    }
}
