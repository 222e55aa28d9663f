//! Property-based tests for ConnectionRegistry and RoomDirectory.
//!
//! Random sequences of accept/register/join/unregister are applied directly
//! to the registry and directory, and membership invariants are checked after
//! every step.

use std::{collections::HashSet, ops::Sub, time::Duration};

use proptest::prelude::*;
use roomcast_core::{ConnectionConfig, Limits};
use roomcast_server::{ConnectionRegistry, DEFAULT_ROOM, RoomDirectory};

/// Millisecond counter standing in for an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Millis(u64);

impl Sub for Millis {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}

#[derive(Debug, Clone)]
enum Step {
    Accept(u64),
    Register(u64, String),
    Join(u64, String),
    Unregister(u64),
}

fn step() -> impl Strategy<Value = Step> {
    let session = 1u64..6;
    prop_oneof![
        session.clone().prop_map(Step::Accept),
        (session.clone(), "[a-z ]{0,6}").prop_map(|(id, name)| Step::Register(id, name)),
        (session.clone(), prop::sample::select(vec!["general", "tech", "music", "x"]))
            .prop_map(|(id, room)| Step::Join(id, room.to_string())),
        session.prop_map(Step::Unregister),
    ]
}

fn registry() -> ConnectionRegistry<Millis> {
    ConnectionRegistry::new(ConnectionConfig::default(), Limits::default(), DEFAULT_ROOM)
}

/// Apply one step, ignoring rejected input the same way the driver would.
fn apply(registry: &mut ConnectionRegistry<Millis>, rooms: &mut RoomDirectory, step: &Step, at: u64) {
    let now = Millis(at);
    match step {
        Step::Accept(id) => {
            registry.accept(*id, now);
        },
        Step::Register(id, name) => {
            let _ = registry.register(rooms, *id, name, now, at);
        },
        Step::Join(id, room) => {
            if Limits::default().room_name(room).is_ok() {
                let _ = rooms.join(registry, *id, room, at);
            }
        },
        Step::Unregister(id) => {
            registry.unregister(rooms, *id);
        },
    }
}

/// Every registered session is in exactly the room it thinks it is in, and
/// nobody else is in any room.
fn check_membership(
    registry: &ConnectionRegistry<Millis>,
    rooms: &RoomDirectory,
) -> Result<(), TestCaseError> {
    let mut total_members = 0;
    for (room, size) in rooms.room_sizes() {
        total_members += size;
        for id in rooms.member_ids(&room) {
            prop_assert_eq!(registry.current_room(id), Some(room.as_str()));
        }
    }

    prop_assert_eq!(total_members, registry.registered_count());

    for id in registry.registered_session_ids() {
        let room = registry.current_room(id);
        prop_assert!(room.is_some(), "registered session {} has no room", id);
        prop_assert!(rooms.is_member(room.unwrap_or_default(), id));
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: membership and current_room never drift apart
    #[test]
    fn prop_membership_matches_current_room(steps in prop::collection::vec(step(), 1..60)) {
        let mut registry = registry();
        let mut rooms = RoomDirectory::new();

        for (at, step) in (0u64..).zip(&steps) {
            apply(&mut registry, &mut rooms, step, at);
            check_membership(&registry, &rooms)?;
        }
    }

    /// Property: user ids are never reused, even after departures
    #[test]
    fn prop_user_ids_are_unique(steps in prop::collection::vec(step(), 1..60)) {
        let mut registry = registry();
        let mut rooms = RoomDirectory::new();
        let mut seen = HashSet::new();

        for (at, step) in (0u64..).zip(&steps) {
            let before: HashSet<String> = registry
                .sessions()
                .filter_map(|(_, info)| info.user_id.clone())
                .collect();

            apply(&mut registry, &mut rooms, step, at);

            for (_, info) in registry.sessions() {
                if let Some(user_id) = &info.user_id
                    && !before.contains(user_id)
                {
                    prop_assert!(seen.insert(user_id.clone()), "user id {} reused", user_id);
                }
            }
        }
    }

    /// Property: unregistering twice changes nothing the second time
    #[test]
    fn prop_unregister_is_idempotent(
        steps in prop::collection::vec(step(), 0..40),
        victim in 1u64..6,
    ) {
        let mut registry = registry();
        let mut rooms = RoomDirectory::new();
        for (at, step) in (0u64..).zip(&steps) {
            apply(&mut registry, &mut rooms, step, at);
        }

        registry.unregister(&mut rooms, victim);
        let sizes = rooms.room_sizes();
        let count = registry.session_count();

        prop_assert!(registry.unregister(&mut rooms, victim).is_none());
        prop_assert_eq!(rooms.room_sizes(), sizes);
        prop_assert_eq!(registry.session_count(), count);
    }

    /// Property: a rejected name leaves the session unregistered and roomless
    #[test]
    fn prop_invalid_names_never_register(name in "[ ]{0,4}[a-z]?[ ]{0,4}") {
        let mut registry = registry();
        let mut rooms = RoomDirectory::new();
        registry.accept(1, Millis(0));

        prop_assert!(registry.register(&mut rooms, 1, &name, Millis(0), 0).is_err());
        prop_assert_eq!(registry.registered_count(), 0);
        prop_assert_eq!(registry.current_room(1), None);
        prop_assert_eq!(rooms.member_count(DEFAULT_ROOM), 0);
    }
}
