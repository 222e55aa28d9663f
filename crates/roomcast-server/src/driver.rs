//! Server driver.
//!
//! Ties together the connection registry, room directory and presence
//! queries, and routes every client frame. The driver never touches a socket:
//! it consumes [`ServerEvent`]s and returns [`ServerAction`]s for the runtime
//! to execute, so the same logic runs under tokio and in the simulation
//! harness.

use std::time::Instant;

use bytes::Bytes;
use roomcast_core::{ChatError, ConnectionConfig, Environment, Limits};
use roomcast_proto::{ClientFrame, ServerFrame};

use crate::{
    presence::PresenceTracker,
    registry::ConnectionRegistry,
    rooms::RoomDirectory,
    server_error::DriverError,
};

/// Room every session is placed in when it registers.
pub const DEFAULT_ROOM: &str = "general";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Connection configuration (registration and heartbeat timeouts)
    pub connection: ConnectionConfig,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Name and message limits
    pub limits: Limits,
    /// Room assigned on registration
    pub default_room: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            max_connections: 10_000,
            limits: Limits::default(),
            default_room: DEFAULT_ROOM.to_string(),
        }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the external runtime (simulation or production).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection ID assigned by the runtime
        session_id: u64,
    },

    /// A text or binary message was received from a connection
    FrameReceived {
        /// Connection that sent the message
        session_id: u64,
        /// Raw message body
        payload: Bytes,
    },

    /// A transport-level ping or pong arrived
    HeartbeatReceived {
        /// Connection that sent it
        session_id: u64,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Periodic tick for timeout checking
    Tick,
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code (production or simulation).
#[derive(Debug, Clone)]
pub enum ServerAction<I = Instant> {
    /// Send a frame to a specific session
    SendToSession {
        /// Target session ID
        session_id: u64,
        /// Frame to send
        frame: ServerFrame,
    },

    /// Send the same frame to several sessions
    ///
    /// Recipients are resolved when the action is produced, so membership
    /// changes after that point don't affect delivery.
    Broadcast {
        /// Target session IDs
        recipients: Vec<u64>,
        /// Frame to broadcast
        frame: ServerFrame,
    },

    /// Close a connection
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
        /// When the event occurred
        timestamp: I,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

type Actions<E> = Vec<ServerAction<<E as Environment>::Instant>>;

/// Action-based server driver.
///
/// Orchestrates registration, room membership, presence and message routing.
pub struct ServerDriver<E>
where
    E: Environment,
{
    /// Session identity and lifecycle
    registry: ConnectionRegistry<E::Instant>,
    /// Room membership
    rooms: RoomDirectory,
    /// Environment (time)
    env: E,
    /// Server configuration
    config: ServerConfig,
}

impl<E> ServerDriver<E>
where
    E: Environment,
{
    /// Create a new server driver.
    pub fn new(env: E, config: ServerConfig) -> Self {
        let registry = ConnectionRegistry::new(
            config.connection.clone(),
            config.limits.clone(),
            config.default_room.clone(),
        );

        Self { registry, rooms: RoomDirectory::new(), env, config }
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the server driver. Client mistakes
    /// never surface as `Err`; they become `error` frames for the offending
    /// session.
    ///
    /// # Errors
    ///
    /// - `DriverError::SessionAlreadyExists` if a session ID is reused
    /// - `DriverError::SessionNotFound` if a frame arrives for an unknown
    ///   session
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Actions<E>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                self.handle_connection_accepted(session_id)
            },
            ServerEvent::FrameReceived { session_id, payload } => {
                self.handle_frame_received(session_id, &payload)
            },
            ServerEvent::HeartbeatReceived { session_id } => {
                let now = self.env.now();
                self.registry.touch_heartbeat(session_id, now);
                Ok(Vec::new())
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_departure(session_id, &reason))
            },
            ServerEvent::Tick => Ok(self.handle_tick()),
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_accepted(&mut self, session_id: u64) -> Result<Actions<E>, DriverError> {
        let now = self.env.now();

        if self.registry.session_count() >= self.config.max_connections {
            return Ok(vec![ServerAction::CloseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        if !self.registry.accept(session_id, now) {
            return Err(DriverError::SessionAlreadyExists(session_id));
        }

        Ok(vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("connection accepted, session_id={session_id}"),
            timestamp: now,
        }])
    }

    /// Handle a message received from a connection.
    fn handle_frame_received(
        &mut self,
        session_id: u64,
        payload: &[u8],
    ) -> Result<Actions<E>, DriverError> {
        if !self.registry.has_session(session_id) {
            return Err(DriverError::SessionNotFound(session_id));
        }

        let frame = match ClientFrame::decode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                let mut actions = self.reject(session_id, "frame", &ChatError::from(e.clone()));
                actions.push(self.log(
                    LogLevel::Debug,
                    format!("undecodable frame from session {session_id}: {e}"),
                ));
                return Ok(actions);
            },
        };

        let kind = frame.kind();
        let result = match frame {
            ClientFrame::Register { username } => self.handle_register(session_id, &username),
            ClientFrame::Chat { content } => self.handle_chat(session_id, &content),
            ClientFrame::JoinRoom { room } => self.handle_join_room(session_id, &room),
            ClientFrame::GetUsers => self.handle_get_users(session_id),
            ClientFrame::GetRooms => self.handle_get_rooms(session_id),
            ClientFrame::Ping => Ok(self.handle_ping(session_id)),
        };

        match result {
            Ok(actions) => Ok(actions),
            Err(DriverError::Chat(err)) => Ok(self.reject(session_id, kind, &err)),
            Err(e) => Err(e),
        }
    }

    fn handle_register(&mut self, session_id: u64, username: &str) -> Result<Actions<E>, DriverError> {
        let now = self.env.now();
        let joined_at = self.env.wall_clock_millis();

        let registration =
            self.registry.register(&mut self.rooms, session_id, username, now, joined_at)?;

        let total_users = self.presence().global_user_count();
        let mut others: Vec<u64> =
            self.registry.session_ids().filter(|&id| id != session_id).collect();
        others.sort_unstable();

        let mut actions = vec![ServerAction::SendToSession {
            session_id,
            frame: ServerFrame::Welcome {
                user_id: registration.user_id.clone(),
                username: registration.display_name.clone(),
                message: format!(
                    "Welcome, {}! You are in #{}.",
                    registration.display_name, registration.room
                ),
            },
        }];

        if !others.is_empty() {
            actions.push(ServerAction::Broadcast {
                recipients: others,
                frame: ServerFrame::UserJoined {
                    username: registration.display_name.clone(),
                    total_users,
                },
            });
        }

        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!(
                "session {session_id} registered as {} ({}), {total_users} users online",
                registration.display_name, registration.user_id
            ),
            timestamp: now,
        });

        Ok(actions)
    }

    fn handle_chat(&mut self, session_id: u64, content: &str) -> Result<Actions<E>, DriverError> {
        let sender = self.registry.require_registered(session_id, "chat")?;
        self.config.limits.message(content)?;

        let recipients = self.rooms.member_ids(sender.room);
        let frame = ServerFrame::Message {
            user_id: sender.user_id.to_owned(),
            username: sender.display_name.to_owned(),
            room: sender.room.to_owned(),
            content: content.to_owned(),
            timestamp: self.env.wall_clock_millis(),
        };

        let log = self.log(
            LogLevel::Debug,
            format!(
                "session {session_id} posted {} bytes to #{} ({} recipients)",
                content.len(),
                sender.room,
                recipients.len()
            ),
        );

        Ok(vec![ServerAction::Broadcast { recipients, frame }, log])
    }

    fn handle_join_room(&mut self, session_id: u64, requested: &str) -> Result<Actions<E>, DriverError> {
        let display_name =
            self.registry.require_registered(session_id, "join_room")?.display_name.to_owned();
        let room = self.config.limits.room_name(requested)?.to_owned();
        let joined_at = self.env.wall_clock_millis();

        let outcome = self.rooms.join(&mut self.registry, session_id, &room, joined_at)?;

        let mut actions = vec![ServerAction::SendToSession {
            session_id,
            frame: ServerFrame::RoomChanged {
                room: outcome.room.clone(),
                message: format!("You joined #{}", outcome.room),
            },
        }];

        if outcome.changed {
            let others: Vec<u64> = self
                .rooms
                .member_ids(&outcome.room)
                .into_iter()
                .filter(|&id| id != session_id)
                .collect();

            if !others.is_empty() {
                actions.push(ServerAction::Broadcast {
                    recipients: others,
                    frame: ServerFrame::UserJoinedRoom {
                        username: display_name,
                        room: outcome.room.clone(),
                    },
                });
            }

            actions.push(self.log(
                LogLevel::Info,
                format!(
                    "session {session_id} moved from #{} to #{}",
                    outcome.previous.as_deref().unwrap_or("-"),
                    outcome.room
                ),
            ));
        }

        Ok(actions)
    }

    fn handle_get_users(&mut self, session_id: u64) -> Result<Actions<E>, DriverError> {
        let room = self.registry.require_registered(session_id, "get_users")?.room;
        let snapshot = self.presence().room_snapshot(room);

        Ok(vec![ServerAction::SendToSession { session_id, frame: snapshot.into_frame() }])
    }

    fn handle_get_rooms(&mut self, session_id: u64) -> Result<Actions<E>, DriverError> {
        self.registry.require_registered(session_id, "get_rooms")?;
        let rooms = self.presence().room_list();

        Ok(vec![ServerAction::SendToSession { session_id, frame: ServerFrame::RoomsList { rooms } }])
    }

    /// Application-level ping. Answered whether or not the session has
    /// registered; only registered sessions have a heartbeat to extend.
    fn handle_ping(&mut self, session_id: u64) -> Actions<E> {
        let now = self.env.now();
        self.registry.touch_heartbeat(session_id, now);

        vec![ServerAction::SendToSession {
            session_id,
            frame: ServerFrame::Pong { timestamp: self.env.wall_clock_millis() },
        }]
    }

    /// Remove a session and tell the remaining users. Idempotent.
    fn handle_departure(&mut self, session_id: u64, reason: &str) -> Actions<E> {
        let Some(info) = self.registry.unregister(&mut self.rooms, session_id) else {
            return Vec::new();
        };

        let mut actions = Vec::new();

        if let Some(username) = info.display_name {
            let total_users = self.registry.registered_count();
            let recipients: Vec<u64> = self.registry.registered_session_ids().collect();

            if !recipients.is_empty() {
                actions.push(ServerAction::Broadcast {
                    recipients,
                    frame: ServerFrame::UserLeft { username, total_users },
                });
            }
        }

        actions.push(self.log(
            LogLevel::Info,
            format!("session {session_id} closed: {reason}"),
        ));

        actions
    }

    /// Handle periodic tick: evict connections whose deadline passed.
    fn handle_tick(&mut self) -> Actions<E> {
        let now = self.env.now();
        let mut actions = Vec::new();

        for (session_id, timeout) in self.registry.sweep(now) {
            let reason = timeout.to_string();
            actions.extend(self.handle_departure(session_id, &reason));
            actions.push(ServerAction::CloseConnection { session_id, reason });
        }

        actions
    }

    /// Error frame for the offending session plus a log line.
    fn reject(&self, session_id: u64, kind: &str, error: &ChatError) -> Actions<E> {
        vec![
            ServerAction::SendToSession { session_id, frame: ServerFrame::error(error.to_string()) },
            self.log(LogLevel::Warn, format!("rejected {kind} from session {session_id}: {error}")),
        ]
    }

    fn log(&self, level: LogLevel, message: String) -> ServerAction<E::Instant> {
        ServerAction::Log { level, message, timestamp: self.env.now() }
    }

    /// Presence queries over the current state.
    pub fn presence(&self) -> PresenceTracker<'_, E::Instant> {
        PresenceTracker::new(&self.registry, &self.rooms)
    }

    /// Session registry.
    pub fn registry(&self) -> &ConnectionRegistry<E::Instant> {
        &self.registry
    }

    /// Room directory.
    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    /// Number of tracked connections, registered or not.
    pub fn connection_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl<E> std::fmt::Debug for ServerDriver<E>
where
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connections", &self.registry.session_count())
            .field("registered", &self.registry.registered_count())
            .field("rooms", &self.rooms.room_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            // Using real Instant for simplicity in unit tests
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn wall_clock_millis(&self) -> u64 {
            1_700_000_000_000
        }
    }

    fn frame(json: &str) -> Bytes {
        Bytes::copy_from_slice(json.as_bytes())
    }

    fn send(server: &mut ServerDriver<TestEnv>, session_id: u64, json: &str) -> Vec<ServerAction> {
        server.process_event(ServerEvent::FrameReceived { session_id, payload: frame(json) }).unwrap()
    }

    fn sent_to(actions: &[ServerAction], target: u64) -> Vec<ServerFrame> {
        actions
            .iter()
            .filter_map(|action| match action {
                ServerAction::SendToSession { session_id, frame } if *session_id == target => {
                    Some(frame.clone())
                },
                ServerAction::Broadcast { recipients, frame } if recipients.contains(&target) => {
                    Some(frame.clone())
                },
                _ => None,
            })
            .collect()
    }

    fn connect(server: &mut ServerDriver<TestEnv>, session_id: u64, name: &str) {
        server.process_event(ServerEvent::ConnectionAccepted { session_id }).unwrap();
        send(server, session_id, &format!(r#"{{"type":"register","username":"{name}"}}"#));
    }

    #[test]
    fn server_accepts_connection() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());

        let actions =
            server.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();

        assert_eq!(server.connection_count(), 1);
        assert!(matches!(actions[0], ServerAction::Log { level: LogLevel::Debug, .. }));
    }

    #[test]
    fn server_rejects_when_max_connections_exceeded() {
        let config = ServerConfig { max_connections: 2, ..Default::default() };
        let mut server = ServerDriver::new(TestEnv, config);

        server.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();
        server.process_event(ServerEvent::ConnectionAccepted { session_id: 2 }).unwrap();

        let actions =
            server.process_event(ServerEvent::ConnectionAccepted { session_id: 3 }).unwrap();

        assert_eq!(server.connection_count(), 2);
        assert!(matches!(actions[0], ServerAction::CloseConnection { session_id: 3, .. }));
    }

    #[test]
    fn duplicate_session_id_is_an_error() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());
        server.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();

        let result = server.process_event(ServerEvent::ConnectionAccepted { session_id: 1 });
        assert_eq!(result.unwrap_err(), DriverError::SessionAlreadyExists(1));
    }

    #[test]
    fn frame_for_unknown_session_is_an_error() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());

        let result = server.process_event(ServerEvent::FrameReceived {
            session_id: 9,
            payload: frame(r#"{"type":"ping"}"#),
        });
        assert_eq!(result.unwrap_err(), DriverError::SessionNotFound(9));
    }

    #[test]
    fn register_sends_welcome_and_announces() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());
        connect(&mut server, 1, "Ali");

        server.process_event(ServerEvent::ConnectionAccepted { session_id: 2 }).unwrap();
        let actions = send(&mut server, 2, r#"{"type":"register","username":" Bea "}"#);

        let to_bea = sent_to(&actions, 2);
        assert!(matches!(
            &to_bea[..],
            [ServerFrame::Welcome { username, .. }] if username == "Bea"
        ));

        let to_ali = sent_to(&actions, 1);
        assert_eq!(to_ali, vec![ServerFrame::UserJoined {
            username: "Bea".to_string(),
            total_users: 2
        }]);
    }

    #[test]
    fn first_registration_reaches_unregistered_connections() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());
        server.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();
        server.process_event(ServerEvent::ConnectionAccepted { session_id: 2 }).unwrap();

        let actions = send(&mut server, 2, r#"{"type":"register","username":"Ali"}"#);

        assert_eq!(sent_to(&actions, 1), vec![ServerFrame::UserJoined {
            username: "Ali".to_string(),
            total_users: 1
        }]);
        assert!(matches!(&sent_to(&actions, 2)[..], [ServerFrame::Welcome { .. }]));
    }

    #[test]
    fn malformed_frame_gets_error_reply() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());
        server.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();

        for raw in ["not json", r#"{"type":"dance"}"#, r#"{"type":"chat"}"#] {
            let actions = send(&mut server, 1, raw);
            assert_eq!(sent_to(&actions, 1), vec![ServerFrame::error(
                roomcast_proto::MALFORMED_FRAME_MESSAGE
            )]);
        }

        // Connection survives
        assert_eq!(server.connection_count(), 1);
    }

    #[test]
    fn chat_before_register_is_rejected() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());
        server.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();

        let actions = send(&mut server, 1, r#"{"type":"chat","content":"hi"}"#);
        let frames = sent_to(&actions, 1);

        assert_eq!(frames, vec![ServerFrame::error(
            ChatError::NotRegistered { action: "chat" }.to_string()
        )]);
    }

    #[test]
    fn chat_reaches_room_members_only() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());
        connect(&mut server, 1, "Ali");
        connect(&mut server, 2, "Bea");
        connect(&mut server, 3, "Cem");
        send(&mut server, 3, r#"{"type":"join_room","room":"tech"}"#);

        let actions = send(&mut server, 1, r#"{"type":"chat","content":"hello"}"#);

        assert_eq!(sent_to(&actions, 1).len(), 1);
        assert_eq!(sent_to(&actions, 2).len(), 1);
        assert!(sent_to(&actions, 3).is_empty());
    }

    #[test]
    fn rejoining_same_room_only_confirms() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());
        connect(&mut server, 1, "Ali");
        connect(&mut server, 2, "Bea");

        let actions = send(&mut server, 1, r#"{"type":"join_room","room":"general"}"#);

        assert_eq!(sent_to(&actions, 1).len(), 1);
        assert!(sent_to(&actions, 2).is_empty());
    }

    #[test]
    fn ping_gets_pong() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());
        server.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();

        let actions = send(&mut server, 1, r#"{"type":"ping"}"#);
        assert_eq!(sent_to(&actions, 1), vec![ServerFrame::Pong { timestamp: 1_700_000_000_000 }]);
    }

    #[test]
    fn server_handles_connection_closed() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());
        connect(&mut server, 1, "Ali");
        connect(&mut server, 2, "Bea");

        let actions = server
            .process_event(ServerEvent::ConnectionClosed {
                session_id: 1,
                reason: "client disconnect".to_string(),
            })
            .unwrap();

        assert_eq!(server.connection_count(), 1);
        assert_eq!(sent_to(&actions, 2), vec![ServerFrame::UserLeft {
            username: "Ali".to_string(),
            total_users: 1
        }]);

        // Second close is a no-op
        let actions = server
            .process_event(ServerEvent::ConnectionClosed {
                session_id: 1,
                reason: "client disconnect".to_string(),
            })
            .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn unregistered_close_is_silent() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());
        connect(&mut server, 1, "Ali");
        server.process_event(ServerEvent::ConnectionAccepted { session_id: 2 }).unwrap();

        let actions = server
            .process_event(ServerEvent::ConnectionClosed { session_id: 2, reason: "eof".to_string() })
            .unwrap();

        assert!(sent_to(&actions, 1).is_empty());
    }

    #[test]
    fn tick_without_timeouts_does_nothing() {
        let mut server = ServerDriver::new(TestEnv, ServerConfig::default());
        connect(&mut server, 1, "Ali");

        let actions = server.process_event(ServerEvent::Tick).unwrap();
        assert!(actions.is_empty());
        assert_eq!(server.connection_count(), 1);
    }
}
