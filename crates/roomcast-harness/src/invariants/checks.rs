//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashMap;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// A session's `current_room` and the room member sets agree.
///
/// A session listed as a member of room R has `current_room == R`, and a
/// session with `current_room == R` is listed in R. Together these imply a
/// session is in at most one room.
pub struct MembershipConsistency;

impl Invariant for MembershipConsistency {
    fn name(&self) -> &'static str {
        "membership_consistency"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for room in &state.rooms {
            for &member in &room.members {
                let current = state.session(member).and_then(|s| s.current_room.as_deref());
                if current != Some(room.name.as_str()) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "session {member} listed in #{} but current_room is {current:?}",
                            room.name
                        ),
                    });
                }
            }
        }

        for session in &state.sessions {
            if let Some(room) = &session.current_room {
                let listed = state.room(room).is_some_and(|r| r.members.contains(&session.session_id));
                if !listed {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "session {} has current_room #{room} but is not a member",
                            session.session_id
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Registered sessions have an id, a name and a room; unregistered ones have
/// none of them.
pub struct IdentityMatchesState;

impl Invariant for IdentityMatchesState {
    fn name(&self) -> &'static str {
        "identity_matches_state"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            let fields = [
                session.user_id.is_some(),
                session.display_name.is_some(),
                session.current_room.is_some(),
            ];

            if fields.iter().any(|&set| set != session.registered) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("session {session:?} has identity fields {fields:?}"),
                });
            }
        }

        Ok(())
    }
}

/// User ids are never shared between live sessions.
pub struct UniqueUserIds;

impl Invariant for UniqueUserIds {
    fn name(&self) -> &'static str {
        "unique_user_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut seen: HashMap<&str, u64> = HashMap::new();

        for session in &state.sessions {
            if let Some(user_id) = &session.user_id
                && let Some(other) = seen.insert(user_id, session.session_id)
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "user id {user_id} held by sessions {other} and {}",
                        session.session_id
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Presence's user count equals the number of registered sessions.
pub struct UserCountMatches;

impl Invariant for UserCountMatches {
    fn name(&self) -> &'static str {
        "user_count_matches"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let registered = state.sessions.iter().filter(|s| s.registered).count();

        if registered == state.global_user_count {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!(
                    "presence reports {} users, {registered} sessions registered",
                    state.global_user_count
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariants::{RoomSnapshot, SessionSnapshot};

    fn registered(session_id: u64, room: &str) -> SessionSnapshot {
        SessionSnapshot {
            session_id,
            registered: true,
            user_id: Some(format!("user_{session_id}")),
            display_name: Some(format!("name{session_id}")),
            current_room: Some(room.to_string()),
        }
    }

    #[test]
    fn detects_member_without_current_room() {
        let mut session = registered(1, "general");
        session.current_room = Some("tech".to_string());

        let state = SystemSnapshot {
            sessions: vec![session],
            rooms: vec![RoomSnapshot { name: "general".to_string(), members: vec![1] }],
            global_user_count: 1,
        };

        assert!(MembershipConsistency.check(&state).is_err());
    }

    #[test]
    fn detects_half_registered_session() {
        let mut session = registered(1, "general");
        session.display_name = None;

        let state = SystemSnapshot {
            sessions: vec![session],
            rooms: vec![RoomSnapshot { name: "general".to_string(), members: vec![1] }],
            global_user_count: 1,
        };

        assert!(IdentityMatchesState.check(&state).is_err());
    }

    #[test]
    fn detects_shared_user_id() {
        let mut second = registered(2, "general");
        second.user_id = Some("user_1".to_string());

        let state = SystemSnapshot {
            sessions: vec![registered(1, "general"), second],
            rooms: vec![RoomSnapshot { name: "general".to_string(), members: vec![1, 2] }],
            global_user_count: 2,
        };

        assert!(UniqueUserIds.check(&state).is_err());
        assert!(MembershipConsistency.check(&state).is_ok());
    }

    #[test]
    fn detects_count_mismatch() {
        let state = SystemSnapshot {
            sessions: vec![registered(1, "general")],
            rooms: vec![RoomSnapshot { name: "general".to_string(), members: vec![1] }],
            global_user_count: 3,
        };

        assert!(UserCountMatches.check(&state).is_err());
    }
}
