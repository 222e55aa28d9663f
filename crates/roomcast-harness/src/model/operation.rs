//! Operations for model-based testing.
//!
//! Operations represent everything a client or the clock can do. They are
//! generated randomly by proptest (or decoded from fuzzer input) and applied
//! to both the model and the real implementation.

use arbitrary::Arbitrary;

/// Client slot identifier (0-indexed).
pub type ClientId = u8;

/// Display name choices, covering valid and invalid input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ModelName {
    /// A plain valid name
    Valid(u8),
    /// A valid name wrapped in whitespace
    Padded(u8),
    /// One character
    TooShort,
    /// Only whitespace
    Blank,
    /// One character over the limit
    TooLong,
}

impl ModelName {
    /// The name as a client would send it.
    pub fn to_wire(self) -> String {
        match self {
            Self::Valid(n) => format!("user{}", n % 8),
            Self::Padded(n) => format!("  user{} ", n % 8),
            Self::TooShort => "x".to_string(),
            Self::Blank => "   ".to_string(),
            Self::TooLong => "n".repeat(33),
        }
    }
}

/// Room name choices (kept small so clients collide).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ModelRoom {
    /// The default room
    General,
    /// One of a few extra rooms
    Named(u8),
    /// Invalid: one character
    TooShort,
}

impl ModelRoom {
    /// The room name as a client would send it.
    pub fn to_wire(self) -> String {
        match self {
            Self::General => "general".to_string(),
            Self::Named(n) => format!("room{}", n % 4),
            Self::TooShort => "r".to_string(),
        }
    }
}

/// Chat content choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum SmallMessage {
    /// Ordinary text
    Text(u8),
    /// Whitespace only
    Blank,
    /// One byte over the limit
    Oversize,
}

impl SmallMessage {
    /// The content as a client would send it.
    pub fn to_wire(self) -> String {
        match self {
            Self::Text(n) => format!("message {n}"),
            Self::Blank => " \t ".to_string(),
            Self::Oversize => "a".repeat(4097),
        }
    }
}

/// Operations that can be applied to the system.
///
/// Operations naming a client that isn't connected are no-ops on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Open a connection for the client if it has none.
    Connect {
        /// Client connecting
        client_id: ClientId,
    },

    /// Send `register`.
    Register {
        /// Client registering
        client_id: ClientId,
        /// Requested name
        name: ModelName,
    },

    /// Send `chat`.
    Chat {
        /// Client sending
        client_id: ClientId,
        /// Message content
        content: SmallMessage,
    },

    /// Send `join_room`.
    JoinRoom {
        /// Client moving
        client_id: ClientId,
        /// Target room
        room: ModelRoom,
    },

    /// Send `get_users`.
    GetUsers {
        /// Client asking
        client_id: ClientId,
    },

    /// Send `get_rooms`.
    GetRooms {
        /// Client asking
        client_id: ClientId,
    },

    /// Send an application-level `ping`.
    Ping {
        /// Client pinging
        client_id: ClientId,
    },

    /// Transport-level ping (no reply frame).
    Heartbeat {
        /// Client pinging
        client_id: ClientId,
    },

    /// Send bytes that aren't a valid frame.
    SendGarbage {
        /// Client sending
        client_id: ClientId,
    },

    /// Close the client's connection.
    Disconnect {
        /// Client leaving
        client_id: ClientId,
    },

    /// Advance simulation time.
    AdvanceTime {
        /// Seconds to advance
        secs: u8,
    },

    /// Run a heartbeat sweep.
    Tick,
}

impl Operation {
    /// Client the operation acts for, if any.
    pub fn client_id(&self) -> Option<ClientId> {
        match self {
            Self::Connect { client_id }
            | Self::Register { client_id, .. }
            | Self::Chat { client_id, .. }
            | Self::JoinRoom { client_id, .. }
            | Self::GetUsers { client_id }
            | Self::GetRooms { client_id }
            | Self::Ping { client_id }
            | Self::Heartbeat { client_id }
            | Self::SendGarbage { client_id }
            | Self::Disconnect { client_id } => Some(*client_id),
            Self::AdvanceTime { .. } | Self::Tick => None,
        }
    }

    /// Same operation with its client folded into `0..num_clients`.
    pub fn clamp_client(self, num_clients: u8) -> Self {
        let clamp = |id: ClientId| id % num_clients.max(1);
        match self {
            Self::Connect { client_id } => Self::Connect { client_id: clamp(client_id) },
            Self::Register { client_id, name } => Self::Register { client_id: clamp(client_id), name },
            Self::Chat { client_id, content } => Self::Chat { client_id: clamp(client_id), content },
            Self::JoinRoom { client_id, room } => Self::JoinRoom { client_id: clamp(client_id), room },
            Self::GetUsers { client_id } => Self::GetUsers { client_id: clamp(client_id) },
            Self::GetRooms { client_id } => Self::GetRooms { client_id: clamp(client_id) },
            Self::Ping { client_id } => Self::Ping { client_id: clamp(client_id) },
            Self::Heartbeat { client_id } => Self::Heartbeat { client_id: clamp(client_id) },
            Self::SendGarbage { client_id } => Self::SendGarbage { client_id: clamp(client_id) },
            Self::Disconnect { client_id } => Self::Disconnect { client_id: clamp(client_id) },
            op @ (Self::AdvanceTime { .. } | Self::Tick) => op,
        }
    }
}
