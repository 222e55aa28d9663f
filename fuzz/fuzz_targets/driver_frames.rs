//! Fuzz target for hostile payloads reaching the driver
//!
//! # Strategy
//!
//! - Raw bytes: anything a client could put in a WebSocket message
//! - Near-valid JSON: a known `type` with fuzzed fields
//!
//! # Invariants
//!
//! - A payload from a live session never makes the driver return an error
//! - The session is never closed for sending a bad frame
//! - Registry and room directory stay consistent

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use roomcast_harness::{InvariantRegistry, SimServer, SystemSnapshot};

#[derive(Debug, Arbitrary)]
enum Payload {
    Raw(Vec<u8>),
    Typed { kind: FrameKind, field: String },
}

#[derive(Debug, Arbitrary)]
enum FrameKind {
    Register,
    Chat,
    JoinRoom,
    GetUsers,
}

impl Payload {
    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Raw(bytes) => bytes.clone(),
            Self::Typed { kind, field } => {
                let field = field.replace('\\', "\\\\").replace('"', "\\\"");
                let json = match kind {
                    FrameKind::Register => format!(r#"{{"type":"register","username":"{field}"}}"#),
                    FrameKind::Chat => format!(r#"{{"type":"chat","content":"{field}"}}"#),
                    FrameKind::JoinRoom => format!(r#"{{"type":"join_room","room":"{field}"}}"#),
                    FrameKind::GetUsers => format!(r#"{{"type":"get_users","extra":"{field}"}}"#),
                };
                json.into_bytes()
            },
        }
    }
}

fuzz_target!(|payloads: Vec<Payload>| {
    let mut server = SimServer::new();
    let sender = server.connect().expect("fresh session");
    let peer = server.connect_as("peer").expect("fresh session");
    let invariants = InvariantRegistry::standard();

    for payload in payloads.iter().take(64) {
        server.send_raw(sender, &payload.to_bytes()).expect("live session never errors");

        assert!(!server.is_closed(sender));
        assert!(!server.is_closed(peer));
        invariants.assert_all(&SystemSnapshot::from_driver(server.driver()), "after payload");
    }
});
