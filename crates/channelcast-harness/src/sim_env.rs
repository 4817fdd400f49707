//! Pinned environment for deterministic day bucketing.

#![allow(clippy::disallowed_types, reason = "Locking a single timestamp")]

use std::sync::{Arc, Mutex};

use channelcast_core::Environment;
use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone};

/// Environment whose clock only moves when told to.
///
/// Clones share the same clock, so a test can hold one handle and advance
/// time under a router that owns another.
#[derive(Clone)]
pub struct SimEnv {
    now: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl SimEnv {
    /// Environment pinned to `now`.
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        Self { now: Arc::new(Mutex::new(now)) }
    }

    /// Environment pinned to a local wall-clock time at `offset_hours` from
    /// UTC.
    ///
    /// # Panics
    ///
    /// Panics if the offset or date is out of range. Test setup only.
    #[allow(clippy::expect_used)]
    pub fn local(offset_hours: i32, y: i32, m: u32, d: u32, hh: u32, mm: u32) -> Self {
        let tz = FixedOffset::east_opt(offset_hours * 3600).expect("offset within a day");
        let now = tz.with_ymd_and_hms(y, m, d, hh, mm, 0).single().expect("valid local time");
        Self::at(now)
    }

    /// Move the clock to `now`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().expect("Mutex poisoned") = now;
    }

    /// Move the clock forward by `delta`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().expect("Mutex poisoned");
        *now = *now + delta;
    }
}

impl Environment for SimEnv {
    #[allow(clippy::expect_used)]
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().expect("Mutex poisoned")
    }
}
