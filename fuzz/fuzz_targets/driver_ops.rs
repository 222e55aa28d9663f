//! Fuzz target for operation sequences against the model
//!
//! Decodes a sequence of client and clock operations and plays it through
//! both `ModelWorld` and the real driver on virtual time.
//!
//! # Invariants
//!
//! - Every client receives exactly the frame kinds the model predicts
//! - Registry and room directory stay consistent after every operation
//! - Final observable state matches the model

#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use roomcast_harness::{
    Deliveries, InvariantRegistry, ModelWorld, ObservableState, Operation, SimServer,
    SystemSnapshot,
};
use roomcast_proto::ClientFrame;

const NUM_CLIENTS: u8 = 4;

fuzz_target!(|ops: Vec<Operation>| {
    let mut model = ModelWorld::new(usize::from(NUM_CLIENTS));
    let mut server = SimServer::new();
    let mut slots: Vec<Option<u64>> = vec![None; usize::from(NUM_CLIENTS)];
    let invariants = InvariantRegistry::standard();

    for op in ops.into_iter().take(256) {
        let op = op.clamp_client(NUM_CLIENTS);
        let before = slots.clone();

        let expected = model.apply(&op);
        apply(&mut server, &mut slots, &op);
        let actual = drain(&mut server, &before, &slots);

        assert_eq!(expected, actual, "divergence at {op:?}");
        invariants.assert_all(&SystemSnapshot::from_driver(server.driver()), "after operation");
    }

    assert_eq!(model.observable_state(), observe(&server, &slots));
});

fn apply(server: &mut SimServer, slots: &mut [Option<u64>], op: &Operation) {
    let session = op.client_id().and_then(|c| slots[usize::from(c)]);

    let frame = match op {
        Operation::Register { name, .. } => Some(ClientFrame::Register { username: name.to_wire() }),
        Operation::Chat { content, .. } => Some(ClientFrame::Chat { content: content.to_wire() }),
        Operation::JoinRoom { room, .. } => Some(ClientFrame::JoinRoom { room: room.to_wire() }),
        Operation::GetUsers { .. } => Some(ClientFrame::GetUsers),
        Operation::GetRooms { .. } => Some(ClientFrame::GetRooms),
        Operation::Ping { .. } => Some(ClientFrame::Ping),
        _ => None,
    };

    if let (Some(frame), Some(session_id)) = (frame, session) {
        server.send(session_id, &frame).expect("live session");
        return;
    }

    match op {
        Operation::Connect { client_id } if session.is_none() => {
            slots[usize::from(*client_id)] = Some(server.connect().expect("fresh session"));
        },
        Operation::Heartbeat { .. } => {
            if let Some(session_id) = session {
                server.heartbeat(session_id).expect("live session");
            }
        },
        Operation::SendGarbage { .. } => {
            if let Some(session_id) = session {
                server.send_raw(session_id, b"}{").expect("live session");
            }
        },
        Operation::Disconnect { client_id } => {
            if let Some(session_id) = slots[usize::from(*client_id)].take() {
                server.disconnect(session_id).expect("live session");
            }
        },
        Operation::AdvanceTime { secs } => server.advance(Duration::from_secs(u64::from(*secs))),
        Operation::Tick => {
            server.tick().expect("tick never fails");
            for slot in slots.iter_mut() {
                if slot.is_some_and(|session_id| server.is_closed(session_id)) {
                    *slot = None;
                }
            }
        },
        _ => {},
    }
}

fn drain(server: &mut SimServer, before: &[Option<u64>], after: &[Option<u64>]) -> Deliveries {
    let mut out = Deliveries::new();

    for (client_id, (old, new)) in before.iter().zip(after).enumerate() {
        let mut sessions: Vec<u64> = old.iter().chain(new.iter()).copied().collect();
        sessions.dedup();

        let kinds: Vec<&'static str> = sessions
            .into_iter()
            .flat_map(|session_id| server.drain(session_id))
            .map(|frame| frame.kind())
            .collect();

        if !kinds.is_empty() {
            out.insert(client_id as u8, kinds);
        }
    }

    out
}

fn observe(server: &SimServer, slots: &[Option<u64>]) -> ObservableState {
    let registry = server.driver().registry();
    let info = |slot: &Option<u64>| slot.and_then(|session_id| registry.session(session_id));

    ObservableState {
        connected: slots.iter().map(Option::is_some).collect(),
        names: slots.iter().map(|s| info(s).and_then(|i| i.display_name.clone())).collect(),
        rooms: slots.iter().map(|s| info(s).and_then(|i| i.current_room.clone())).collect(),
        known_rooms: server.driver().rooms().room_sizes().into_iter().map(|(room, _)| room).collect(),
    }
}
