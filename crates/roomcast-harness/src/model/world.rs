//! The reference model.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use roomcast_core::{ConnectionConfig, Limits};

use super::operation::{ClientId, Operation};

/// Frame kinds each client received from one operation, in arrival order.
///
/// Clients that received nothing are absent.
pub type Deliveries = BTreeMap<ClientId, Vec<&'static str>>;

/// Model state of one open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSession {
    /// Display name once registered
    pub name: Option<String>,
    /// Current room once registered
    pub room: Option<String>,
    accepted_at: Duration,
    last_heartbeat: Duration,
}

impl ModelSession {
    fn is_registered(&self) -> bool {
        self.name.is_some()
    }
}

/// What both the model and the real system expose for comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservableState {
    /// Per client: connected at all
    pub connected: Vec<bool>,
    /// Per client: registered display name
    pub names: Vec<Option<String>>,
    /// Per client: current room
    pub rooms: Vec<Option<String>>,
    /// Every room ever created
    pub known_rooms: BTreeSet<String>,
}

/// Reference model of the relay.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    clients: Vec<Option<ModelSession>>,
    known_rooms: BTreeSet<String>,
    now: Duration,
    limits: Limits,
    connection: ConnectionConfig,
    default_room: String,
}

impl ModelWorld {
    /// Model with `num_clients` slots and default limits and timeouts.
    pub fn new(num_clients: usize) -> Self {
        Self {
            clients: vec![None; num_clients],
            known_rooms: BTreeSet::new(),
            now: Duration::ZERO,
            limits: Limits::default(),
            connection: ConnectionConfig::default(),
            default_room: roomcast_server::DEFAULT_ROOM.to_string(),
        }
    }

    /// Session state for a client, if connected.
    pub fn session(&self, client_id: ClientId) -> Option<&ModelSession> {
        self.clients.get(usize::from(client_id)).and_then(Option::as_ref)
    }

    /// Apply an operation and predict what every client receives.
    pub fn apply(&mut self, op: &Operation) -> Deliveries {
        let mut out = Deliveries::new();

        match op {
            Operation::Connect { client_id } => {
                let now = self.now;
                if let Some(slot) = self.clients.get_mut(usize::from(*client_id))
                    && slot.is_none()
                {
                    *slot = Some(ModelSession {
                        name: None,
                        room: None,
                        accepted_at: now,
                        last_heartbeat: now,
                    });
                }
            },

            Operation::Register { client_id, name } => {
                let Some(session) = self.session(*client_id) else { return out };
                let name = name.to_wire();
                let trimmed = name.trim();

                if session.is_registered() || !self.name_ok(trimmed) {
                    push(&mut out, *client_id, "error");
                    return out;
                }

                for other in self.connected_clients() {
                    if other != *client_id {
                        push(&mut out, other, "user_joined");
                    }
                }
                push(&mut out, *client_id, "welcome");

                let now = self.now;
                let room = self.default_room.clone();
                self.known_rooms.insert(room.clone());
                if let Some(session) = self.session_mut(*client_id) {
                    session.name = Some(trimmed.to_string());
                    session.room = Some(room);
                    session.last_heartbeat = now;
                }
            },

            Operation::Chat { client_id, content } => {
                let Some(session) = self.session(*client_id) else { return out };
                let content = content.to_wire();

                let room = match &session.room {
                    Some(room) if self.message_ok(&content) => room.clone(),
                    _ => {
                        push(&mut out, *client_id, "error");
                        return out;
                    },
                };

                for member in self.members(&room) {
                    push(&mut out, member, "message");
                }
            },

            Operation::JoinRoom { client_id, room } => {
                let Some(session) = self.session(*client_id) else { return out };
                let room = room.to_wire();
                let target = room.trim().to_string();

                let Some(current) = session.room.clone() else {
                    push(&mut out, *client_id, "error");
                    return out;
                };
                if !self.room_ok(&target) {
                    push(&mut out, *client_id, "error");
                    return out;
                }

                push(&mut out, *client_id, "room_changed");
                if current != target {
                    for member in self.members(&target) {
                        push(&mut out, member, "user_joined_room");
                    }
                    self.known_rooms.insert(target.clone());
                    if let Some(session) = self.session_mut(*client_id) {
                        session.room = Some(target);
                    }
                }
            },

            Operation::GetUsers { client_id } | Operation::GetRooms { client_id } => {
                let Some(session) = self.session(*client_id) else { return out };
                let reply = if !session.is_registered() {
                    "error"
                } else if matches!(op, Operation::GetUsers { .. }) {
                    "users_list"
                } else {
                    "rooms_list"
                };
                push(&mut out, *client_id, reply);
            },

            Operation::Ping { client_id } => {
                if self.session(*client_id).is_some() {
                    self.touch(*client_id);
                    push(&mut out, *client_id, "pong");
                }
            },

            Operation::Heartbeat { client_id } => self.touch(*client_id),

            Operation::SendGarbage { client_id } => {
                if self.session(*client_id).is_some() {
                    push(&mut out, *client_id, "error");
                }
            },

            Operation::Disconnect { client_id } => {
                let departed = self
                    .clients
                    .get_mut(usize::from(*client_id))
                    .and_then(Option::take)
                    .is_some_and(|s| s.is_registered());

                if departed {
                    for other in self.registered_clients() {
                        push(&mut out, other, "user_left");
                    }
                }
            },

            Operation::AdvanceTime { secs } => {
                self.now += Duration::from_secs(u64::from(*secs));
            },

            Operation::Tick => {
                let expired: Vec<ClientId> = self
                    .clients
                    .iter()
                    .enumerate()
                    .filter_map(|(id, slot)| {
                        let session = slot.as_ref()?;
                        self.is_expired(session).then_some(id as ClientId)
                    })
                    .collect();

                let mut departed_registered = 0;
                for &id in &expired {
                    let was_registered = self.clients[usize::from(id)]
                        .take()
                        .is_some_and(|s| s.is_registered());
                    if was_registered {
                        departed_registered += 1;
                    }
                }

                for _ in 0..departed_registered {
                    for other in self.registered_clients() {
                        push(&mut out, other, "user_left");
                    }
                }
            },
        }

        out
    }

    /// Current observable state.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            connected: self.clients.iter().map(Option::is_some).collect(),
            names: self.clients.iter().map(|s| s.as_ref().and_then(|s| s.name.clone())).collect(),
            rooms: self.clients.iter().map(|s| s.as_ref().and_then(|s| s.room.clone())).collect(),
            known_rooms: self.known_rooms.clone(),
        }
    }

    fn session_mut(&mut self, client_id: ClientId) -> Option<&mut ModelSession> {
        self.clients.get_mut(usize::from(client_id)).and_then(Option::as_mut)
    }

    fn touch(&mut self, client_id: ClientId) {
        let now = self.now;
        if let Some(session) = self.session_mut(client_id) {
            session.last_heartbeat = session.last_heartbeat.max(now);
        }
    }

    fn is_expired(&self, session: &ModelSession) -> bool {
        if session.is_registered() {
            self.now.saturating_sub(session.last_heartbeat) > self.connection.idle_timeout
        } else {
            self.now.saturating_sub(session.accepted_at) > self.connection.registration_timeout
        }
    }

    fn connected_clients(&self) -> Vec<ClientId> {
        self.clients
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(id, _)| id as ClientId)
            .collect()
    }

    fn registered_clients(&self) -> Vec<ClientId> {
        self.clients
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().is_some_and(ModelSession::is_registered))
            .map(|(id, _)| id as ClientId)
            .collect()
    }

    fn members(&self, room: &str) -> Vec<ClientId> {
        self.clients
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.as_ref().is_some_and(|s| s.room.as_deref() == Some(room))
            })
            .map(|(id, _)| id as ClientId)
            .collect()
    }

    fn name_ok(&self, name: &str) -> bool {
        let len = name.chars().count();
        len >= self.limits.min_name_len && len <= self.limits.max_name_len
    }

    fn room_ok(&self, room: &str) -> bool {
        let len = room.chars().count();
        len >= self.limits.min_room_len && len <= self.limits.max_room_len
    }

    fn message_ok(&self, content: &str) -> bool {
        content.len() <= self.limits.max_message_bytes && !content.trim().is_empty()
    }
}

fn push(out: &mut Deliveries, client_id: ClientId, kind: &'static str) {
    out.entry(client_id).or_default().push(kind);
}
