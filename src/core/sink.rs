//! # Observer sink: inbound daemon signals.
//!
//! Daemons call these from their own threads. Every entry point takes the supervisor lock
//! briefly and never fails; faults are queued in the accumulator for the next drain.
//!
//! Signals from daemons that are not supervised (never started, already removed or
//! recycled to pending) are logged and ignored.

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::state::DaemonKey;
use crate::core::supervisor::Shared;
use crate::daemons::{Daemon, DaemonObserver};
use crate::error::{BoxError, DaemonFault};
use crate::events::{Event, EventKind};

impl Shared {
    fn accumulate(&self, daemon: &dyn Daemon, fault: DaemonFault, terminated: bool) {
        let key = DaemonKey::of(daemon);
        let added = {
            let mut st = self.state();
            if !st.is_tracked(key) {
                drop(st);
                warn!(daemon = %daemon.identification(), fault = %fault, "fault from unsupervised daemon ignored");
                return;
            }
            if terminated {
                st.terminated.insert(key);
            }
            st.record_fault(fault.clone())
        };

        if terminated {
            self.bus.publish(
                Event::new(EventKind::DaemonTerminated)
                    .with_daemon(daemon.identification())
                    .with_reason(fault.to_string()),
            );
        }
        if added {
            warn!(daemon = %daemon.identification(), fault = %fault, "daemon fault reported");
            self.bus.publish(
                Event::new(EventKind::FaultReported)
                    .with_daemon(daemon.identification())
                    .with_reason(fault.to_string()),
            );
        }
    }
}

impl DaemonObserver for Shared {
    fn receive_heartbeat(&self, daemon: &dyn Daemon) {
        let key = DaemonKey::of(daemon);
        let mut st = self.state();
        if !st.is_tracked(key) {
            drop(st);
            warn!(daemon = %daemon.identification(), "heartbeat from unsupervised daemon ignored");
            return;
        }
        if let Some(record) = st.heartbeats.get_mut(&key) {
            record.beat(Instant::now());
        }
    }

    fn terminated_normally(&self, daemon: &dyn Daemon) {
        let key = DaemonKey::of(daemon);
        {
            let mut st = self.state();
            if !st.is_tracked(key) {
                drop(st);
                debug!(daemon = %daemon.identification(), "termination of unsupervised daemon ignored");
                return;
            }
            st.terminated.insert(key);
        }
        debug!(daemon = %daemon.identification(), "daemon terminated normally");
        self.bus
            .publish(Event::new(EventKind::DaemonTerminated).with_daemon(daemon.identification()));
    }

    fn terminated_exceptionally(&self, daemon: &dyn Daemon, cause: BoxError) {
        let fault = DaemonFault::wrap(daemon.identification(), cause);
        self.accumulate(daemon, fault, true);
    }

    fn exception_occurred(&self, daemon: &dyn Daemon, fault: DaemonFault) {
        if !self.state().is_tracked(DaemonKey::of(daemon)) {
            warn!(daemon = %daemon.identification(), fault = %fault, "fault from unsupervised daemon ignored");
            return;
        }
        daemon.request_stop();
        self.accumulate(daemon, fault, false);
    }
}
