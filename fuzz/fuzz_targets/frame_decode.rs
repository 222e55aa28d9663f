//! Fuzz target for ClientFrame::decode
//!
//! Arbitrary bytes off the socket must decode to a frame or an error.
//!
//! # Invariants
//!
//! - NEVER panic, whatever the input
//! - Anything that decodes re-encodes and decodes to the same frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use roomcast_proto::ClientFrame;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = ClientFrame::decode(data) else {
        return;
    };

    let encoded = frame.encode().expect("decoded frames always encode");
    let again = ClientFrame::decode(encoded.as_bytes()).expect("encoded frames always decode");
    assert_eq!(frame, again);
});
