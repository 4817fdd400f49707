//! Environment abstraction for deterministic testing.
//!
//! Decouples the fan-out logic from the system clock. Production code reads
//! the local wall clock, simulation pins the clock to a chosen instant and
//! UTC offset so day-bucket behavior is reproducible.

use chrono::{DateTime, FixedOffset};

/// Abstract environment providing the caller's local wall-clock time.
///
/// # Invariants
///
/// - `now()` carries the caller's local UTC offset. Day buckets are derived
///   from the local calendar day, so an environment that reports UTC for a
///   caller in another zone files messages under the wrong day.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current local time, including the local offset from UTC.
    fn now(&self) -> DateTime<FixedOffset>;
}
