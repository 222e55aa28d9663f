//! Relay state invariants.
//!
//! A [`SystemSnapshot`] copies what the driver knows about sessions and rooms
//! at one instant; each [`Invariant`] inspects that copy and reports the first
//! inconsistency it finds. Tests check the snapshot between driver events,
//! never mid-event, so every invariant must hold at every event boundary.
//!
//! ```ignore
//! let snapshot = SystemSnapshot::from_driver(server.driver());
//! InvariantRegistry::standard().assert_all(&snapshot, "after join");
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{IdentityMatchesState, MembershipConsistency, UniqueUserIds, UserCountMatches};
pub use snapshot::{RoomSnapshot, SessionSnapshot, SystemSnapshot};

/// Outcome of one invariant check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Invariant that failed
    pub invariant: &'static str,
    /// What was found
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property of relay state that holds between events.
pub trait Invariant: Send + Sync {
    /// Short identifier used in reports.
    fn name(&self) -> &'static str;

    /// Inspect a snapshot.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// A set of invariants checked together.
#[derive(Default)]
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything the relay promises about membership and identity:
    /// [`MembershipConsistency`], [`IdentityMatchesState`],
    /// [`UniqueUserIds`] and [`UserCountMatches`].
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(MembershipConsistency);
        registry.add(IdentityMatchesState);
        registry.add(UniqueUserIds);
        registry.add(UserCountMatches);
        registry
    }

    /// Include another invariant.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Run every invariant, collecting all violations.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// [`Self::check_all`], panicking with a report if anything failed.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        let Err(violations) = self.check_all(state) else {
            return;
        };

        let report: Vec<String> = violations.iter().map(ToString::to_string).collect();
        panic!("{} invariant(s) broken {context}:\n  {}", report.len(), report.join("\n  "));
    }

    /// Number of invariants in the set.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
