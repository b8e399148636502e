//! # Per-daemon heartbeat bookkeeping.
//!
//! A [`HeartbeatRecord`] exists for every daemon from the moment a start pass picks it up
//! until it is fully removed. At each check the supervisor calls [`HeartbeatRecord::check`]:
//!
//! ```text
//! now - last_heartbeat > check_period  → missed += 1
//! otherwise                            → missed  = 0
//! missed > max_missed_heartbeats       → daemon is reported by MissingHeartbeats
//! ```

use std::time::Duration;

use tokio::time::Instant;

/// Heartbeat state of one daemon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatRecord {
    last_heartbeat: Instant,
    missed: u32,
}

impl HeartbeatRecord {
    /// Fresh record: stamped `now`, no misses.
    pub fn new(now: Instant) -> Self {
        Self {
            last_heartbeat: now,
            missed: 0,
        }
    }

    /// Time of the last heartbeat (or of creation/reset).
    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
    }

    /// Consecutive missed checks.
    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Time since the last heartbeat.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_heartbeat)
    }

    /// Records a heartbeat received at `now`.
    pub(crate) fn beat(&mut self, now: Instant) {
        self.last_heartbeat = now;
        self.missed = 0;
    }

    /// Clears misses and restamps the record.
    pub(crate) fn reset(&mut self, now: Instant) {
        self.beat(now);
    }

    /// Applies one periodic check and returns the resulting miss count.
    pub(crate) fn check(&mut self, now: Instant, period: Duration) -> u32 {
        if self.age(now) > period {
            self.missed = self.missed.saturating_add(1);
        } else {
            self.missed = 0;
        }
        self.missed
    }
}
