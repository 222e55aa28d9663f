//! Room directory: named rooms and their member sets.
//!
//! Rooms are created the first time someone joins them and persist after they
//! empty out, so `get_rooms` keeps listing them with a zero count.

use std::{collections::HashMap, ops::Sub, time::Duration};

use roomcast_core::ChatError;

use crate::{registry::ConnectionRegistry, server_error::DriverError};

/// A room member and when they entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    /// Session ID
    pub session_id: u64,
    /// Wall-clock join stamp, Unix milliseconds
    pub joined_at: u64,
}

/// What a join did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Room the session is now in
    pub room: String,
    /// Room it left, if any
    pub previous: Option<String>,
    /// `false` when the session was already in `room`
    pub changed: bool,
}

#[derive(Debug, Default)]
struct Room {
    /// Session ID → join stamp
    members: HashMap<u64, u64>,
}

/// Directory of rooms.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<String, Room>,
}

impl RoomDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a registered session into `room`, leaving its previous room.
    ///
    /// Rejoining the current room is a no-op and keeps the original join
    /// stamp.
    ///
    /// # Errors
    ///
    /// - `DriverError::SessionNotFound` if the registry doesn't know the
    ///   session
    /// - `ChatError::NotRegistered` if the session hasn't registered
    pub fn join<I>(
        &mut self,
        registry: &mut ConnectionRegistry<I>,
        session_id: u64,
        room: &str,
        joined_at: u64,
    ) -> Result<JoinOutcome, DriverError>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        let connection =
            registry.connection(session_id).ok_or(DriverError::SessionNotFound(session_id))?;
        if !connection.is_registered() {
            return Err(ChatError::NotRegistered { action: "join_room" }.into());
        }

        let previous = registry.current_room(session_id).map(str::to_owned);
        if previous.as_deref() == Some(room) {
            return Ok(JoinOutcome { room: room.to_owned(), previous, changed: false });
        }

        if let Some(previous) = &previous {
            self.remove_member(previous, session_id);
        }

        self.rooms.entry(room.to_owned()).or_default().members.insert(session_id, joined_at);
        registry.set_current_room(session_id, Some(room.to_owned()));

        Ok(JoinOutcome { room: room.to_owned(), previous, changed: true })
    }

    /// Take a session out of its current room.
    ///
    /// Returns the room it was in, or `None` if it was in none.
    pub fn leave<I>(&mut self, registry: &mut ConnectionRegistry<I>, session_id: u64) -> Option<String>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        let room = registry.current_room(session_id)?.to_owned();
        self.remove_member(&room, session_id);
        registry.set_current_room(session_id, None);
        Some(room)
    }

    /// Members of a room ordered by join time, then session ID.
    ///
    /// Unknown rooms have no members.
    pub fn members(&self, room: &str) -> Vec<Member> {
        let Some(room) = self.rooms.get(room) else {
            return Vec::new();
        };

        let mut members: Vec<Member> = room
            .members
            .iter()
            .map(|(&session_id, &joined_at)| Member { session_id, joined_at })
            .collect();
        members.sort_unstable_by_key(|m| (m.joined_at, m.session_id));
        members
    }

    /// Session IDs in a room, ordered like [`Self::members`].
    pub fn member_ids(&self, room: &str) -> Vec<u64> {
        self.members(room).into_iter().map(|m| m.session_id).collect()
    }

    /// Number of members in a room.
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |r| r.members.len())
    }

    /// Check if a session is in a room.
    pub fn is_member(&self, room: &str, session_id: u64) -> bool {
        self.rooms.get(room).is_some_and(|r| r.members.contains_key(&session_id))
    }

    /// Check if a room has ever been created.
    pub fn has_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Number of rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Every room with its member count, sorted by name.
    pub fn room_sizes(&self) -> Vec<(String, usize)> {
        let mut sizes: Vec<(String, usize)> =
            self.rooms.iter().map(|(name, room)| (name.clone(), room.members.len())).collect();
        sizes.sort_unstable();
        sizes
    }

    fn remove_member(&mut self, room: &str, session_id: u64) {
        if let Some(room) = self.rooms.get_mut(room) {
            room.members.remove(&session_id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use std::time::Instant;

    use roomcast_core::{ConnectionConfig, Limits};

    use super::*;

    fn setup(sessions: &[u64]) -> (ConnectionRegistry, RoomDirectory) {
        let mut registry =
            ConnectionRegistry::new(ConnectionConfig::default(), Limits::default(), "general");
        let mut rooms = RoomDirectory::new();
        let now = Instant::now();

        for &session_id in sessions {
            registry.accept(session_id, now);
            registry.register(&mut rooms, session_id, "member", now, session_id * 10).unwrap();
        }

        (registry, rooms)
    }

    #[test]
    fn join_moves_between_rooms() {
        let (mut registry, mut rooms) = setup(&[1]);

        let outcome = rooms.join(&mut registry, 1, "tech", 100).unwrap();

        assert_eq!(outcome.room, "tech");
        assert_eq!(outcome.previous.as_deref(), Some("general"));
        assert!(outcome.changed);
        assert!(!rooms.is_member("general", 1));
        assert!(rooms.is_member("tech", 1));
        assert_eq!(registry.current_room(1), Some("tech"));
    }

    #[test]
    fn rejoining_current_room_is_noop() {
        let (mut registry, mut rooms) = setup(&[1]);
        rooms.join(&mut registry, 1, "tech", 100).unwrap();

        let outcome = rooms.join(&mut registry, 1, "tech", 500).unwrap();

        assert!(!outcome.changed);
        assert_eq!(rooms.members("tech"), vec![Member { session_id: 1, joined_at: 100 }]);
    }

    #[test]
    fn join_requires_registration() {
        let (mut registry, mut rooms) = setup(&[]);
        registry.accept(7, Instant::now());

        let result = rooms.join(&mut registry, 7, "tech", 0);

        assert_eq!(
            result,
            Err(DriverError::Chat(ChatError::NotRegistered { action: "join_room" }))
        );
        assert!(!rooms.has_room("tech"));
    }

    #[test]
    fn join_unknown_session_fails() {
        let (mut registry, mut rooms) = setup(&[]);
        let result = rooms.join(&mut registry, 99, "tech", 0);
        assert_eq!(result, Err(DriverError::SessionNotFound(99)));
    }

    #[test]
    fn empty_rooms_persist() {
        let (mut registry, mut rooms) = setup(&[1]);
        rooms.join(&mut registry, 1, "tech", 0).unwrap();

        assert_eq!(rooms.member_count("general"), 0);
        assert!(rooms.has_room("general"));
        assert_eq!(rooms.room_sizes(), vec![("general".to_owned(), 0), ("tech".to_owned(), 1)]);
    }

    #[test]
    fn members_ordered_by_join_time() {
        let (mut registry, mut rooms) = setup(&[1, 2, 3]);

        rooms.join(&mut registry, 3, "tech", 5).unwrap();
        rooms.join(&mut registry, 1, "tech", 9).unwrap();
        rooms.join(&mut registry, 2, "tech", 5).unwrap();

        assert_eq!(rooms.member_ids("tech"), vec![2, 3, 1]);
    }

    #[test]
    fn leave_clears_room_and_registry() {
        let (mut registry, mut rooms) = setup(&[1]);

        assert_eq!(rooms.leave(&mut registry, 1).as_deref(), Some("general"));
        assert_eq!(registry.current_room(1), None);
        assert!(rooms.member_ids("general").is_empty());

        assert_eq!(rooms.leave(&mut registry, 1), None);
    }

    #[test]
    fn unknown_room_has_no_members() {
        let rooms = RoomDirectory::new();
        assert!(rooms.members("nowhere").is_empty());
        assert_eq!(rooms.member_count("nowhere"), 0);
        assert!(!rooms.is_member("nowhere", 1));
    }
}
