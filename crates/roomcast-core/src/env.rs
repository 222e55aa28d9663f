//! Environment abstraction for deterministic testing.
//!
//! Decouples relay logic from system time. Production uses the real clocks;
//! the simulation harness substitutes a virtual clock so heartbeat expiry can
//! be tested without sleeping.

use std::time::Duration;

/// Abstract environment providing time and async sleeping.
///
/// # Invariants
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `wall_clock_millis()` is only used for display timestamps, never for
///   timeout arithmetic
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use a virtual instant that only moves when told to.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only runtime code sleeps; relay logic takes time as a parameter.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Wall-clock time in milliseconds since the Unix epoch.
    ///
    /// Stamped onto chat messages, pongs and room join times.
    fn wall_clock_millis(&self) -> u64;
}
