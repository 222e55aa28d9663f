//! Client and server frame shapes.
//!
//! Both directions use serde's internally tagged representation, so a frame
//! is a flat JSON object whose `type` selects the variant:
//!
//! ```text
//! {"type":"join_room","room":"tech"}
//! {"type":"room_changed","room":"tech","message":"You joined #tech"}
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    MAX_FRAME_BYTES,
    errors::{ProtocolError, Result},
};

/// Frames sent from a client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Claim a display name. Only valid before registration.
    Register {
        /// Requested display name (trimmed by the server)
        username: String,
    },

    /// Post a message to the sender's current room.
    Chat {
        /// Raw message text
        content: String,
    },

    /// Move to another room, creating it if needed.
    JoinRoom {
        /// Target room name (trimmed by the server)
        room: String,
    },

    /// Ask for the member list of the current room.
    GetUsers,

    /// Ask for every known room and its member count.
    GetRooms,

    /// Application-level heartbeat.
    Ping,
}

impl ClientFrame {
    /// Decode a frame from raw bytes.
    ///
    /// Accepts anything that parses as a JSON object with a known `type`.
    /// Oversize input is rejected without being parsed.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge { size: bytes.len(), max: MAX_FRAME_BYTES });
        }

        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Encode as JSON text.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Wire name of this frame's `type`, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Chat { .. } => "chat",
            Self::JoinRoom { .. } => "join_room",
            Self::GetUsers => "get_users",
            Self::GetRooms => "get_rooms",
            Self::Ping => "ping",
        }
    }
}

/// One row of a `users_list` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    /// Server-assigned user id
    pub user_id: String,
    /// Display name
    pub username: String,
    /// When the user entered the room, Unix milliseconds
    pub joined_at: u64,
}

/// One row of a `rooms_list` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEntry {
    /// Room name
    pub room: String,
    /// Number of members currently in the room
    pub count: usize,
}

/// Frames sent from the relay to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Registration succeeded.
    Welcome {
        /// Server-assigned user id
        user_id: String,
        /// Display name as stored (trimmed)
        username: String,
        /// Human-readable greeting
        message: String,
    },

    /// A chat message in the recipient's current room.
    Message {
        /// Sender's user id
        user_id: String,
        /// Sender's display name
        username: String,
        /// Room the message was posted to
        room: String,
        /// Message text
        content: String,
        /// Server receipt time, Unix milliseconds
        timestamp: u64,
    },

    /// Someone registered.
    UserJoined {
        /// New user's display name
        username: String,
        /// Registered users after the join
        total_users: usize,
    },

    /// A registered user disconnected or was evicted.
    UserLeft {
        /// Departed user's display name
        username: String,
        /// Registered users after the departure
        total_users: usize,
    },

    /// Someone entered the recipient's room.
    UserJoinedRoom {
        /// Display name of the arriving user
        username: String,
        /// Room they entered
        room: String,
    },

    /// The recipient's own room changed.
    RoomChanged {
        /// New current room
        room: String,
        /// Human-readable confirmation
        message: String,
    },

    /// Members of a room.
    UsersList {
        /// Room the list describes
        room: String,
        /// Members ordered by join time
        users: Vec<UserEntry>,
        /// Number of members
        count: usize,
    },

    /// Known rooms and their sizes.
    RoomsList {
        /// Rooms ordered by name
        rooms: Vec<RoomEntry>,
    },

    /// Reply to `ping`.
    Pong {
        /// Server time, Unix milliseconds
        timestamp: u64,
    },

    /// The previous frame was rejected.
    Error {
        /// Reason suitable for display
        message: String,
    },
}

impl ServerFrame {
    /// Build an `error` frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Encode as JSON text.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode from JSON text. Used by clients and tests.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Wire name of this frame's `type`, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::Message { .. } => "message",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::UserJoinedRoom { .. } => "user_joined_room",
            Self::RoomChanged { .. } => "room_changed",
            Self::UsersList { .. } => "users_list",
            Self::RoomsList { .. } => "rooms_list",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }
}
