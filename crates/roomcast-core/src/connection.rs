//! Per-connection lifecycle state machine.
//!
//! Tracks registration state and heartbeat deadlines for one client. Uses the
//! action pattern: methods take the current time as input and report what the
//! caller should do, so the machine stays pure and timeouts are testable on a
//! virtual clock.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐  register   ┌────────────┐
//! │ Unregistered │────────────>│ Registered │
//! └──────────────┘             └────────────┘
//!        │                           │
//!        │ registration timeout      │ heartbeat timeout / disconnect
//!        ↓                           ↓
//!   ┌────────┐                  ┌────────┐
//!   │ Closed │                  │ Closed │
//!   └────────┘                  └────────┘
//! ```

use std::{
    fmt,
    ops::Sub,
    time::{Duration, Instant},
};

use crate::error::ChatError;

/// Time an accepted connection has to send a valid `register`.
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum time a registered connection may go without a heartbeat.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, no display name yet
    Unregistered,
    /// Display name assigned; may chat and join rooms
    Registered,
    /// Evicted or disconnected
    Closed,
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Deadline for registering after the connection is accepted
    pub registration_timeout: Duration,
    /// Heartbeat silence tolerated once registered
    pub idle_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// A deadline that expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Never registered in time
    Registration {
        /// Time since the connection was accepted
        elapsed: Duration,
    },
    /// No heartbeat in time
    Idle {
        /// Time since the last heartbeat
        elapsed: Duration,
    },
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registration { elapsed } => write!(f, "registration timeout after {elapsed:?}"),
            Self::Idle { elapsed } => write!(f, "heartbeat timeout after {elapsed:?}"),
        }
    }
}

/// Connection state machine
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Current state
    state: ConnectionState,
    /// Configuration
    config: ConnectionConfig,
    /// When the transport handed us this connection
    accepted_at: I,
    /// Last ping/pong (or registration) seen
    last_heartbeat: I,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new connection in [`ConnectionState::Unregistered`] state
    pub fn new(now: I, config: ConnectionConfig) -> Self {
        Self { state: ConnectionState::Unregistered, config, accepted_at: now, last_heartbeat: now }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the connection completed registration and is still open.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.state == ConnectionState::Registered
    }

    /// When the last heartbeat was recorded.
    #[must_use]
    pub fn last_heartbeat(&self) -> I {
        self.last_heartbeat
    }

    /// Transition to [`ConnectionState::Registered`].
    ///
    /// Starts the heartbeat clock.
    ///
    /// # Errors
    ///
    /// - `ChatError::AlreadyRegistered` if not in Unregistered state
    pub fn register(&mut self, now: I) -> Result<(), ChatError> {
        if self.state != ConnectionState::Unregistered {
            return Err(ChatError::AlreadyRegistered);
        }

        self.state = ConnectionState::Registered;
        self.last_heartbeat = now;
        Ok(())
    }

    /// Guard for actions that need a registered connection.
    ///
    /// # Errors
    ///
    /// - `ChatError::NotRegistered` naming `action` otherwise
    pub fn require_registered(&self, action: &'static str) -> Result<(), ChatError> {
        if self.is_registered() { Ok(()) } else { Err(ChatError::NotRegistered { action }) }
    }

    /// Record a heartbeat. Returns `false` once closed.
    pub fn touch_heartbeat(&mut self, now: I) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }

        if now > self.last_heartbeat {
            self.last_heartbeat = now;
        }
        true
    }

    /// Mark connection as closed.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// The expired deadline, if any. `None` while within limits or closed.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<Timeout> {
        match self.state {
            ConnectionState::Unregistered => {
                let elapsed = now - self.accepted_at;
                (elapsed > self.config.registration_timeout)
                    .then_some(Timeout::Registration { elapsed })
            },
            ConnectionState::Registered => {
                let elapsed = now - self.last_heartbeat;
                (elapsed > self.config.idle_timeout).then_some(Timeout::Idle { elapsed })
            },
            ConnectionState::Closed => None,
        }
    }

    /// Periodic maintenance.
    ///
    /// Closes the connection and reports why if a deadline passed.
    pub fn tick(&mut self, now: I) -> Option<Timeout> {
        let timeout = self.check_timeout(now)?;
        self.close();
        Some(timeout)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn t0() -> Instant {
        Instant::now()
    }

    #[test]
    fn connection_lifecycle() {
        let now = t0();
        let mut conn = Connection::new(now, ConnectionConfig::default());

        assert_eq!(conn.state(), ConnectionState::Unregistered);
        assert!(!conn.is_registered());

        conn.register(now).unwrap();
        assert_eq!(conn.state(), ConnectionState::Registered);
        assert!(conn.is_registered());

        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.is_registered());
    }

    #[test]
    fn register_twice_fails() {
        let now = t0();
        let mut conn = Connection::new(now, ConnectionConfig::default());

        conn.register(now).unwrap();
        assert_eq!(conn.register(now), Err(ChatError::AlreadyRegistered));
    }

    #[test]
    fn require_registered_names_action() {
        let now = t0();
        let conn = Connection::new(now, ConnectionConfig::default());

        assert_eq!(conn.require_registered("chat"), Err(ChatError::NotRegistered { action: "chat" }));
    }

    #[test]
    fn registered_connection_times_out_without_heartbeat() {
        let now = t0();
        let mut conn = Connection::new(now, ConnectionConfig::default());
        conn.register(now).unwrap();

        assert!(conn.tick(now + Duration::from_secs(60)).is_none());

        let timeout = conn.tick(now + Duration::from_secs(61));
        assert!(matches!(timeout, Some(Timeout::Idle { .. })));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn heartbeat_extends_deadline() {
        let now = t0();
        let mut conn = Connection::new(now, ConnectionConfig::default());
        conn.register(now).unwrap();

        let t1 = now + Duration::from_secs(45);
        assert!(conn.touch_heartbeat(t1));

        // 90s after registration, but only 45s after the heartbeat
        assert!(conn.check_timeout(now + Duration::from_secs(90)).is_none());
        assert!(conn.check_timeout(t1 + Duration::from_secs(61)).is_some());
    }

    #[test]
    fn heartbeat_never_moves_backwards() {
        let now = t0();
        let mut conn = Connection::new(now, ConnectionConfig::default());
        conn.register(now + Duration::from_secs(10)).unwrap();

        conn.touch_heartbeat(now);
        assert_eq!(conn.last_heartbeat(), now + Duration::from_secs(10));
    }

    #[test]
    fn unregistered_connection_times_out() {
        let now = t0();
        let config = ConnectionConfig {
            registration_timeout: Duration::from_secs(5),
            ..ConnectionConfig::default()
        };
        let mut conn = Connection::new(now, config);

        // Pings do not buy time before registration
        conn.touch_heartbeat(now + Duration::from_secs(4));

        let timeout = conn.tick(now + Duration::from_secs(6));
        assert!(matches!(timeout, Some(Timeout::Registration { .. })));
    }

    #[test]
    fn closed_connection_never_times_out() {
        let now = t0();
        let mut conn = Connection::new(now, ConnectionConfig::default());
        conn.close();

        assert!(conn.tick(now + Duration::from_secs(3600)).is_none());
        assert!(!conn.touch_heartbeat(now));
    }

    #[test]
    fn timeout_display() {
        let timeout = Timeout::Idle { elapsed: Duration::from_secs(61) };
        assert_eq!(timeout.to_string(), "heartbeat timeout after 61s");
    }
}
