//! # Lifecycle events emitted by the supervisor.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Supervision events**: the `process` loop started or stopped
//! - **Membership events**: daemons added, started, stopped, removed or recovered
//! - **Health events**: terminations, missed heartbeats and reported faults
//!
//! The [`Event`] struct carries the metadata: timestamp, daemon identification, reason,
//! and the miss counter for heartbeat events.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use daemonvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::HeartbeatMissed)
//!     .with_daemon("indexer")
//!     .with_missed(3);
//!
//! assert_eq!(ev.kind, EventKind::HeartbeatMissed);
//! assert_eq!(ev.daemon.as_deref(), Some("indexer"));
//! assert_eq!(ev.missed, Some(3));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Supervision ===
    /// `process` entered the supervision loop.
    SupervisionStarted,

    /// `process` finished its unwind.
    ///
    /// Sets `reason` to the fault label when it ended with a fault.
    SupervisionStopped,

    // === Membership ===
    /// A daemon was inserted into the pending set.
    DaemonAdded,

    /// A running daemon was scheduled for removal.
    DaemonRemoveRequested,

    /// A daemon's `start()` returned and it is now supervised.
    DaemonStarted,

    /// The supervisor asked a daemon to stop.
    DaemonStopRequested,

    /// A daemon was stopped and dropped from supervision.
    DaemonRemoved,

    /// A daemon was stopped and moved back to pending.
    DaemonRecovered,

    // === Health ===
    /// A daemon reported its own termination.
    ///
    /// Sets `reason` when it terminated exceptionally.
    DaemonTerminated,

    /// A daemon's heartbeat was overdue at a check.
    ///
    /// Sets `missed` to the consecutive miss count.
    HeartbeatMissed,

    /// A daemon-caused fault was accumulated.
    FaultReported,
}

/// Supervisor event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Identification of the daemon, if applicable.
    pub daemon: Option<Arc<str>>,
    /// Human-readable reason (fault message, fault label, ...).
    pub reason: Option<Arc<str>>,
    /// Consecutive missed heartbeats.
    pub missed: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            daemon: None,
            reason: None,
            missed: None,
        }
    }

    /// Attaches a daemon identification.
    #[inline]
    pub fn with_daemon(mut self, daemon: impl Into<Arc<str>>) -> Self {
        self.daemon = Some(daemon.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a miss counter.
    #[inline]
    pub fn with_missed(mut self, missed: u32) -> Self {
        self.missed = Some(missed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_increases() {
        let a = Event::new(EventKind::DaemonAdded);
        let b = Event::new(EventKind::DaemonStarted);
        assert!(b.seq > a.seq);
    }
}
