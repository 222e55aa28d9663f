//! Roomcast core.
//!
//! Pure, I/O-free building blocks shared by the relay server and its test
//! harness:
//!
//! - [`env`]: time abstraction so timeouts can run on a virtual clock
//! - [`connection`]: per-connection lifecycle and heartbeat state machine
//! - [`limits`]: display name, room name and message validation
//! - [`error`]: client-facing error taxonomy
//!
//! Nothing here owns a socket or spawns a task. Callers pass the current time
//! in and act on what comes back, which keeps every rule testable without a
//! runtime.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod limits;

pub use connection::{Connection, ConnectionConfig, ConnectionState, Timeout};
pub use env::Environment;
pub use error::ChatError;
pub use limits::Limits;
