//! Read-only presence queries over the registry and room directory.

use std::{ops::Sub, time::Duration};

use roomcast_proto::{RoomEntry, ServerFrame, UserEntry};

use crate::{registry::ConnectionRegistry, rooms::RoomDirectory};

/// A registered user as seen in a room listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPresence {
    /// Session ID
    pub session_id: u64,
    /// User id
    pub user_id: String,
    /// Display name
    pub display_name: String,
    /// When they entered the room, Unix milliseconds
    pub joined_at: u64,
}

/// Point-in-time view of one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    /// Room name
    pub room: String,
    /// Members ordered by join time
    pub users: Vec<UserPresence>,
    /// Number of users listed
    pub count: usize,
}

impl RoomSnapshot {
    /// Build the `users_list` frame for this snapshot.
    pub fn into_frame(self) -> ServerFrame {
        let users = self
            .users
            .into_iter()
            .map(|u| UserEntry { user_id: u.user_id, username: u.display_name, joined_at: u.joined_at })
            .collect();

        ServerFrame::UsersList { room: self.room, users, count: self.count }
    }
}

/// Presence queries.
///
/// Borrows both stores, so a snapshot is always consistent with itself.
#[derive(Debug, Clone, Copy)]
pub struct PresenceTracker<'a, I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    registry: &'a ConnectionRegistry<I>,
    rooms: &'a RoomDirectory,
}

impl<'a, I> PresenceTracker<'a, I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a tracker over the given stores.
    pub fn new(registry: &'a ConnectionRegistry<I>, rooms: &'a RoomDirectory) -> Self {
        Self { registry, rooms }
    }

    /// Registered members of `room`, ordered by join time.
    pub fn room_snapshot(&self, room: &str) -> RoomSnapshot {
        let users: Vec<UserPresence> = self
            .rooms
            .members(room)
            .into_iter()
            .filter_map(|member| {
                let info = self.registry.session(member.session_id)?;
                Some(UserPresence {
                    session_id: member.session_id,
                    user_id: info.user_id.clone()?,
                    display_name: info.display_name.clone()?,
                    joined_at: member.joined_at,
                })
            })
            .collect();

        RoomSnapshot { room: room.to_owned(), count: users.len(), users }
    }

    /// Number of registered users across all rooms.
    pub fn global_user_count(&self) -> usize {
        self.registry.registered_count()
    }

    /// Every known room with its member count, sorted by name.
    pub fn room_list(&self) -> Vec<RoomEntry> {
        self.rooms.room_sizes().into_iter().map(|(room, count)| RoomEntry { room, count }).collect()
    }
}
