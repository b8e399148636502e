//! # Ordered start and stop-and-join passes.
//!
//! ## Start pass
//! ```text
//! Pending snapshot [d0, d1, ..., dN]
//!   ├─► fresh HeartbeatRecord for each
//!   ├─► register observer on each        (before any start: no early signal is lost)
//!   └─► for each di in order:
//!         ├─ unwinding?          ──► leave the rest pending
//!         ├─ claim Pending→Running (skip if another pass got it first)
//!         ├─ alive?              ──► AlreadyRunning
//!         ├─ di.start()          (failure = exceptional termination)
//!         └─ sleep(startup_delay.sample())   unless di is the last one
//! ```
//!
//! ## Stop pass
//! ```text
//! snapshot ─► request_stop() on all ─► join each against ONE shared deadline
//!          ─► still alive? warn (join timeout too low), carry on
//!   removal:  unregister observer, drop record, leave PendingRemoval
//!   recovery: unregister observer, reset record, Running→Pending, clear Terminated
//! ```

use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::core::heartbeat::HeartbeatRecord;
use crate::core::state::DaemonKey;
use crate::core::supervisor::Supervisor;
use crate::daemons::DaemonRef;
use crate::error::{DaemonError, DaemonFault, SupervisorError};
use crate::events::{Event, EventKind};

impl Supervisor {
    /// Starts every pending daemon, in order, with a random stagger between starts.
    pub(crate) async fn start_added_daemons(&self) -> Result<(), SupervisorError> {
        let (batch, delay) = {
            let mut st = self.shared.state();
            if st.pending.is_empty() {
                return Ok(());
            }
            let batch = st.pending.clone();
            let now = Instant::now();
            for d in &batch {
                st.heartbeats
                    .insert(DaemonKey::of(d.as_ref()), HeartbeatRecord::new(now));
            }
            (batch, st.config.startup_delay)
        };

        let observer = self.observer();
        for d in &batch {
            d.register_observer(observer.clone());
        }

        let last = batch.len() - 1;
        for (i, daemon) in batch.iter().enumerate() {
            let id = daemon.identification();
            let claimed = {
                let mut st = self.shared.state();
                if !st.accepts_starts() {
                    debug!(daemon = %id, "supervision unwinding, leaving daemon pending");
                    break;
                }
                st.claim_for_start(daemon)?
            };
            if !claimed {
                debug!(daemon = %id, "daemon no longer pending, skipping start");
                continue;
            }
            // Claimed but not started by us: it stays supervised so the unwind stops it.
            if daemon.is_alive() {
                return Err(SupervisorError::AlreadyRunning {
                    daemon: id.to_string(),
                });
            }

            match daemon.start() {
                Ok(()) => {
                    info!(daemon = %id, "daemon started");
                    self.publish(Event::new(EventKind::DaemonStarted).with_daemon(id));
                    // The unwind may have recycled it between the claim and the start.
                    let tracked = self.shared.state().is_tracked(DaemonKey::of(daemon.as_ref()));
                    if !tracked {
                        warn!(daemon = %id, "daemon recycled while starting, requesting stop");
                        daemon.request_stop();
                    }
                }
                Err(e) => self.start_failed(daemon, e),
            }

            if i < last {
                let pause = delay.sample();
                debug!(delay = ?pause, "staggering next daemon start");
                time::sleep(pause).await;
            }
        }
        Ok(())
    }

    /// A failed `start()` counts as exceptional termination.
    fn start_failed(&self, daemon: &DaemonRef, e: DaemonError) {
        let id = daemon.identification();
        warn!(daemon = %id, error = %e, "daemon failed to start");
        let fault = DaemonFault::new(id, e);
        {
            let mut st = self.shared.state();
            st.terminated.insert(DaemonKey::of(daemon.as_ref()));
            st.record_fault(fault.clone());
        }
        self.publish(
            Event::new(EventKind::FaultReported)
                .with_daemon(id)
                .with_reason(fault.to_string()),
        );
    }

    /// Requests a stop from every daemon in `batch`, then joins them.
    ///
    /// Join time is bounded by a single deadline shared by the whole batch.
    pub(crate) async fn stop_and_join(&self, batch: &[DaemonRef]) {
        if batch.is_empty() {
            return;
        }
        let join_timeout = self.shared.state().config.join_timeout;

        for d in batch {
            debug!(daemon = %d.identification(), "requesting stop");
            d.request_stop();
            self.publish(Event::new(EventKind::DaemonStopRequested).with_daemon(d.identification()));
        }

        let deadline = Instant::now() + join_timeout;
        for d in batch {
            let id = d.identification();
            let remaining = deadline.saturating_duration_since(Instant::now());
            match d.join(remaining).await {
                Ok(true) => debug!(daemon = %id, "daemon joined"),
                Ok(false) => debug!(daemon = %id, ?remaining, "join timed out"),
                Err(e) => warn!(daemon = %id, error = %e, "join interrupted"),
            }
            if d.is_alive() {
                warn!(
                    daemon = %id,
                    join_timeout = ?join_timeout,
                    "daemon still alive after join; join timeout may be too low"
                );
            }
        }
    }

    /// Stops and drops everything pending removal.
    pub(crate) async fn stop_removed_daemons(&self) {
        let batch = self.shared.state().pending_removal.clone();
        self.remove_stopped(batch).await;
    }

    /// Removal variant of the stop pass.
    pub(crate) async fn remove_stopped(&self, batch: Vec<DaemonRef>) {
        if batch.is_empty() {
            return;
        }
        self.stop_and_join(&batch).await;

        let observer = self.observer();
        for d in &batch {
            let id = d.identification();
            d.unregister_observer(&observer);
            let forgotten = {
                let mut st = self.shared.state();
                st.info = None;
                st.forget(DaemonKey::of(d.as_ref()))
            };
            match forgotten {
                Some(was_terminated) => {
                    info!(daemon = %id, was_terminated, "daemon removed");
                    self.publish(Event::new(EventKind::DaemonRemoved).with_daemon(id));
                }
                None => debug!(daemon = %id, "daemon already removed"),
            }
        }
    }

    /// Recovery variant of the stop pass over every running daemon.
    ///
    /// Stops only the daemons running when it is called; [`Self::drain_supervised`]
    /// repeats it until nothing is left.
    pub(crate) async fn recover_running_daemons(&self) {
        let batch = self.shared.state().running.clone();
        if batch.is_empty() {
            return;
        }
        self.stop_and_join(&batch).await;

        let observer = self.observer();
        for d in &batch {
            let id = d.identification();
            d.unregister_observer(&observer);
            let recovered = {
                let mut st = self.shared.state();
                st.info = None;
                st.recover(DaemonKey::of(d.as_ref()), Instant::now())
            };
            match recovered {
                Some(was_terminated) => {
                    debug!(daemon = %id, was_terminated, "daemon recycled to pending");
                    self.publish(Event::new(EventKind::DaemonRecovered).with_daemon(id));
                }
                // Moved to pending removal meanwhile; its own removal pass handles it.
                None => debug!(daemon = %id, "daemon left running set during recovery"),
            }
        }
    }

    /// Unwind passes: removal then recovery, repeated until no daemon is supervised.
    ///
    /// Daemons claimed by a start pass that raced the first snapshot are caught by a
    /// later round.
    pub(crate) async fn drain_supervised(&self) {
        loop {
            self.stop_removed_daemons().await;
            self.recover_running_daemons().await;
            if self.shared.state().is_settled() {
                return;
            }
            debug!("daemons joined the supervised sets during unwind, repeating");
        }
    }
}
