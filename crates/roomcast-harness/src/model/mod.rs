//! Reference model for model-based testing.
//!
//! [`ModelWorld`] is a deliberately naive re-statement of the relay rules:
//! flat per-client records, no registry, no room directory. Operations are
//! applied to both the model and a real driver, and the frames each client
//! receives plus the final observable state must match.

mod operation;
mod world;

pub use operation::{ClientId, ModelName, ModelRoom, Operation, SmallMessage};
pub use world::{Deliveries, ModelSession, ModelWorld, ObservableState};
