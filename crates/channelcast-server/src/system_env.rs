//! Production Environment implementation using the system clock.
//!
//! `SystemEnv` reads the local wall clock together with the host's current UTC
//! offset. Day buckets follow the host's calendar day, including across DST
//! changes, because the offset is read at every call.

use channelcast_core::Environment;
use chrono::{DateTime, FixedOffset, Local};

/// Production environment using the system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}
