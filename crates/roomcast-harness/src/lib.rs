//! Deterministic simulation harness for Roomcast relay testing.
//!
//! Runs the Sans-IO `ServerDriver` on a virtual clock with in-memory
//! connections, so every scenario (including heartbeat expiry) is
//! reproducible and runs without sockets or sleeps.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and real implementation,
//! and the frames each client receives are compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks over a snapshot of driver state. Use
//! [`InvariantRegistry::standard()`] for the relay's membership and identity
//! invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;
pub mod sim_env;
pub mod sim_server;

pub use invariants::{
    IdentityMatchesState, Invariant, InvariantRegistry, InvariantResult, MembershipConsistency,
    RoomSnapshot, SessionSnapshot, SystemSnapshot, UniqueUserIds, UserCountMatches, Violation,
};
pub use model::{
    ClientId, Deliveries, ModelName, ModelRoom, ModelSession, ModelWorld, ObservableState,
    Operation, SmallMessage,
};
pub use sim_env::{SIM_EPOCH_MILLIS, SimEnv, SimInstant};
pub use sim_server::SimServer;
