//! Connection registry for session identity and heartbeat tracking.
//!
//! Owns every live session: its lifecycle state machine, assigned user id,
//! display name and current room. Room membership itself lives in
//! [`RoomDirectory`]; the two are only ever mutated together through
//! [`ConnectionRegistry::register`], [`ConnectionRegistry::unregister`] and
//! [`RoomDirectory::join`]/[`RoomDirectory::leave`], so `current_room` and the
//! room member sets cannot drift apart.

use std::{
    collections::HashMap,
    ops::Sub,
    time::{Duration, Instant},
};

use roomcast_core::{ChatError, Connection, ConnectionConfig, Limits, Timeout};

use crate::{rooms::RoomDirectory, server_error::DriverError};

/// Identity and placement of a session.
///
/// All fields are `None` until registration; `current_room` is `None` again
/// only while the session is being torn down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Server-assigned user id
    pub user_id: Option<String>,
    /// Trimmed display name
    pub display_name: Option<String>,
    /// Room the session is in
    pub current_room: Option<String>,
}

/// Result of a successful registration, used to build the welcome frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Newly assigned user id
    pub user_id: String,
    /// Stored display name
    pub display_name: String,
    /// Room the session was placed in
    pub room: String,
}

/// Borrowed view of a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredSession<'a> {
    /// Session ID
    pub session_id: u64,
    /// User id
    pub user_id: &'a str,
    /// Display name
    pub display_name: &'a str,
    /// Current room
    pub room: &'a str,
}

#[derive(Debug)]
struct SessionEntry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    connection: Connection<I>,
    info: SessionInfo,
}

/// Registry for tracking sessions.
///
/// Generic over `I` (Instant type) to support virtual time in tests.
#[derive(Debug)]
pub struct ConnectionRegistry<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Session ID → session entry
    sessions: HashMap<u64, SessionEntry<I>>,
    /// Timeouts handed to each new connection
    connection_config: ConnectionConfig,
    /// Display name rules
    limits: Limits,
    /// Room every session lands in on registration
    default_room: String,
    /// Last user id sequence number handed out
    user_seq: u64,
}

impl<I> ConnectionRegistry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new empty registry.
    pub fn new(
        connection_config: ConnectionConfig,
        limits: Limits,
        default_room: impl Into<String>,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            connection_config,
            limits,
            default_room: default_room.into(),
            user_seq: 0,
        }
    }

    /// Track a newly accepted, unregistered session.
    ///
    /// Returns `false` if the session already exists.
    pub fn accept(&mut self, session_id: u64, now: I) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }

        let connection = Connection::new(now, self.connection_config.clone());
        self.sessions.insert(session_id, SessionEntry { connection, info: SessionInfo::default() });
        true
    }

    /// Register a session under a display name and place it in the default
    /// room.
    ///
    /// `joined_at` is the wall-clock stamp recorded for the room join.
    ///
    /// # Errors
    ///
    /// - `DriverError::SessionNotFound` if the session was never accepted
    /// - `ChatError::AlreadyRegistered` on a second registration
    /// - `ChatError::NameInvalid` if the trimmed name is out of bounds
    pub fn register(
        &mut self,
        rooms: &mut RoomDirectory,
        session_id: u64,
        requested_name: &str,
        now: I,
        joined_at: u64,
    ) -> Result<Registration, DriverError> {
        let entry =
            self.sessions.get_mut(&session_id).ok_or(DriverError::SessionNotFound(session_id))?;

        if entry.connection.is_registered() {
            return Err(ChatError::AlreadyRegistered.into());
        }

        let display_name = self.limits.display_name(requested_name)?.to_owned();
        entry.connection.register(now)?;

        self.user_seq += 1;
        let user_id = format!("user_{}", self.user_seq);

        entry.info.user_id = Some(user_id.clone());
        entry.info.display_name = Some(display_name.clone());

        let room = self.default_room.clone();
        rooms.join(self, session_id, &room, joined_at)?;

        Ok(Registration { user_id, display_name, room })
    }

    /// Remove a session, vacating its room first.
    ///
    /// Idempotent: returns the departed session's info (with the room it was
    /// in) the first time and `None` afterwards.
    pub fn unregister(&mut self, rooms: &mut RoomDirectory, session_id: u64) -> Option<SessionInfo> {
        let room = rooms.leave(self, session_id);
        let mut entry = self.sessions.remove(&session_id)?;

        entry.connection.close();
        entry.info.current_room = room;
        Some(entry.info)
    }

    /// Record a heartbeat. Returns `false` if the session is unknown or
    /// closed.
    pub fn touch_heartbeat(&mut self, session_id: u64, now: I) -> bool {
        self.sessions.get_mut(&session_id).is_some_and(|entry| entry.connection.touch_heartbeat(now))
    }

    /// Tick every session's state machine and report expired deadlines.
    ///
    /// Expired sessions are marked closed but stay in the registry until
    /// [`Self::unregister`] removes them. Results are ordered by session ID.
    pub fn sweep(&mut self, now: I) -> Vec<(u64, Timeout)> {
        let mut expired: Vec<(u64, Timeout)> = self
            .sessions
            .iter_mut()
            .filter_map(|(&session_id, entry)| {
                entry.connection.tick(now).map(|timeout| (session_id, timeout))
            })
            .collect();

        expired.sort_unstable_by_key(|(session_id, _)| *session_id);
        expired
    }

    /// Resolve a session that must be registered to perform `action`.
    ///
    /// # Errors
    ///
    /// - `DriverError::SessionNotFound` if the session doesn't exist
    /// - `ChatError::NotRegistered` otherwise
    pub fn require_registered(
        &self,
        session_id: u64,
        action: &'static str,
    ) -> Result<RegisteredSession<'_>, DriverError> {
        let entry =
            self.sessions.get(&session_id).ok_or(DriverError::SessionNotFound(session_id))?;
        entry.connection.require_registered(action)?;

        match (&entry.info.user_id, &entry.info.display_name, &entry.info.current_room) {
            (Some(user_id), Some(display_name), Some(room)) => {
                Ok(RegisteredSession { session_id, user_id, display_name, room })
            },
            _ => Err(ChatError::NotRegistered { action }.into()),
        }
    }

    /// Session metadata. `None` if session doesn't exist.
    pub fn session(&self, session_id: u64) -> Option<&SessionInfo> {
        self.sessions.get(&session_id).map(|entry| &entry.info)
    }

    /// Session state machine. `None` if session doesn't exist.
    pub fn connection(&self, session_id: u64) -> Option<&Connection<I>> {
        self.sessions.get(&session_id).map(|entry| &entry.connection)
    }

    /// Room the session is currently in.
    pub fn current_room(&self, session_id: u64) -> Option<&str> {
        self.sessions.get(&session_id).and_then(|entry| entry.info.current_room.as_deref())
    }

    /// Check if a session is tracked.
    pub fn has_session(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Total number of tracked sessions, registered or not.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of registered sessions.
    pub fn registered_count(&self) -> usize {
        self.sessions.values().filter(|entry| entry.connection.is_registered()).count()
    }

    /// IDs of every registered session, in no particular order.
    pub fn registered_session_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.sessions
            .iter()
            .filter(|(_, entry)| entry.connection.is_registered())
            .map(|(&session_id, _)| session_id)
    }

    /// Every tracked session, registered or not, in no particular order.
    pub fn session_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.sessions.keys().copied()
    }

    /// Every tracked session with its metadata, in no particular order.
    pub fn sessions(&self) -> impl Iterator<Item = (u64, &SessionInfo)> + '_ {
        self.sessions.iter().map(|(&session_id, entry)| (session_id, &entry.info))
    }

    /// Room every session joins on registration.
    pub fn default_room(&self) -> &str {
        &self.default_room
    }

    /// Point a session at a room. Only [`RoomDirectory`] calls this, in the
    /// same operation that updates the member set.
    pub(crate) fn set_current_room(&mut self, session_id: u64, room: Option<String>) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(entry) => {
                entry.info.current_room = room;
                true
            },
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(ConnectionConfig::default(), Limits::default(), "general")
    }

    #[test]
    fn accept_and_lookup_session() {
        let mut registry = registry();
        let now = Instant::now();

        assert!(registry.accept(1, now));
        assert!(registry.has_session(1));
        assert!(!registry.has_session(2));

        let info = registry.session(1).unwrap();
        assert_eq!(info, &SessionInfo::default());
        assert_eq!(registry.registered_count(), 0);
    }

    #[test]
    fn accept_duplicate_session_fails() {
        let mut registry = registry();
        let now = Instant::now();

        assert!(registry.accept(1, now));
        assert!(!registry.accept(1, now));
    }

    #[test]
    fn register_assigns_identity_and_default_room() {
        let mut registry = registry();
        let mut rooms = RoomDirectory::new();
        let now = Instant::now();

        registry.accept(1, now);
        let registration = registry.register(&mut rooms, 1, "  Ali ", now, 1000).unwrap();

        assert_eq!(registration.display_name, "Ali");
        assert_eq!(registration.room, "general");
        assert_eq!(registry.current_room(1), Some("general"));
        assert_eq!(rooms.member_ids("general"), vec![1]);
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn user_ids_are_unique() {
        let mut registry = registry();
        let mut rooms = RoomDirectory::new();
        let now = Instant::now();

        registry.accept(1, now);
        registry.accept(2, now);

        let a = registry.register(&mut rooms, 1, "Ali", now, 0).unwrap();
        let b = registry.register(&mut rooms, 2, "Ali", now, 0).unwrap();

        assert_ne!(a.user_id, b.user_id);
    }

    #[test]
    fn register_rejects_short_name() {
        let mut registry = registry();
        let mut rooms = RoomDirectory::new();
        let now = Instant::now();

        registry.accept(1, now);
        let result = registry.register(&mut rooms, 1, "x", now, 0);

        assert_eq!(result, Err(DriverError::Chat(ChatError::NameInvalid { min: 2, max: 32 })));
        assert_eq!(registry.session(1), Some(&SessionInfo::default()));
        assert!(!rooms.has_room("general"));
    }

    #[test]
    fn register_twice_fails() {
        let mut registry = registry();
        let mut rooms = RoomDirectory::new();
        let now = Instant::now();

        registry.accept(1, now);
        registry.register(&mut rooms, 1, "Ali", now, 0).unwrap();

        let result = registry.register(&mut rooms, 1, "Bob", now, 0);
        assert_eq!(result, Err(DriverError::Chat(ChatError::AlreadyRegistered)));
        assert_eq!(registry.session(1).unwrap().display_name.as_deref(), Some("Ali"));
    }

    #[test]
    fn register_unknown_session_fails() {
        let mut registry = registry();
        let mut rooms = RoomDirectory::new();

        let result = registry.register(&mut rooms, 999, "Ali", Instant::now(), 0);
        assert_eq!(result, Err(DriverError::SessionNotFound(999)));
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut registry = registry();
        let mut rooms = RoomDirectory::new();
        let now = Instant::now();

        registry.accept(1, now);
        registry.register(&mut rooms, 1, "Ali", now, 0).unwrap();

        let info = registry.unregister(&mut rooms, 1).unwrap();
        assert_eq!(info.display_name.as_deref(), Some("Ali"));
        assert_eq!(info.current_room.as_deref(), Some("general"));
        assert!(rooms.member_ids("general").is_empty());

        assert!(registry.unregister(&mut rooms, 1).is_none());
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn require_registered_rejects_unregistered() {
        let mut registry = registry();
        registry.accept(1, Instant::now());

        let result = registry.require_registered(1, "chat");
        assert_eq!(result, Err(DriverError::Chat(ChatError::NotRegistered { action: "chat" })));
    }

    #[test]
    fn sweep_reports_expired_sessions_in_order() {
        let mut registry = registry();
        let mut rooms = RoomDirectory::new();
        let now = Instant::now();

        for session_id in [3, 1, 2] {
            registry.accept(session_id, now);
            registry.register(&mut rooms, session_id, "user", now, 0).unwrap();
        }

        registry.touch_heartbeat(2, now + Duration::from_secs(30));

        let expired = registry.sweep(now + Duration::from_secs(61));
        let ids: Vec<u64> = expired.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(expired.iter().all(|(_, t)| matches!(t, Timeout::Idle { .. })));

        // Expired sessions are no longer counted as registered
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn touch_heartbeat_unknown_session() {
        let mut registry = registry();
        assert!(!registry.touch_heartbeat(42, Instant::now()));
    }
}
