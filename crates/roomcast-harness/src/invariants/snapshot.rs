//! Observable state snapshots for invariant checking.
//!
//! Snapshots copy what the driver exposes at one point in time, so every
//! invariant sees the same consistent state.

use roomcast_core::Environment;
use roomcast_server::ServerDriver;

/// Snapshot of the whole relay.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Every tracked session, ordered by ID.
    pub sessions: Vec<SessionSnapshot>,
    /// Every known room, ordered by name.
    pub rooms: Vec<RoomSnapshot>,
    /// Registered user count as reported by presence.
    pub global_user_count: usize,
}

impl SystemSnapshot {
    /// Capture the current driver state.
    pub fn from_driver<E: Environment>(driver: &ServerDriver<E>) -> Self {
        let registry = driver.registry();

        let mut sessions: Vec<SessionSnapshot> = registry
            .sessions()
            .map(|(session_id, info)| SessionSnapshot {
                session_id,
                registered: registry.connection(session_id).is_some_and(|c| c.is_registered()),
                user_id: info.user_id.clone(),
                display_name: info.display_name.clone(),
                current_room: info.current_room.clone(),
            })
            .collect();
        sessions.sort_by_key(|s| s.session_id);

        let rooms = driver
            .rooms()
            .room_sizes()
            .into_iter()
            .map(|(name, _)| RoomSnapshot { members: driver.rooms().member_ids(&name), name })
            .collect();

        Self { sessions, rooms, global_user_count: driver.presence().global_user_count() }
    }

    /// Look up a session.
    pub fn session(&self, session_id: u64) -> Option<&SessionSnapshot> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }

    /// Look up a room.
    pub fn room(&self, name: &str) -> Option<&RoomSnapshot> {
        self.rooms.iter().find(|r| r.name == name)
    }
}

/// Snapshot of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session ID.
    pub session_id: u64,
    /// Whether the session is registered and open.
    pub registered: bool,
    /// Assigned user id.
    pub user_id: Option<String>,
    /// Display name.
    pub display_name: Option<String>,
    /// Room the registry places the session in.
    pub current_room: Option<String>,
}

/// Snapshot of one room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSnapshot {
    /// Room name.
    pub name: String,
    /// Member session IDs, in join order.
    pub members: Vec<u64>,
}
