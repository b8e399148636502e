//! # Membership state guarded by the supervisor lock.
//!
//! [`State`] holds everything the supervisor shares between its loop, the membership
//! operations and the observer sink: the lifecycle sets, heartbeat records, the fault
//! accumulator and the run flags.
//!
//! ## Lifecycle sets
//! ```text
//!   set_daemons / add_daemon
//!            │
//!            ▼
//!        Pending ──── start pass ────► Running ──── remove_daemon ────► PendingRemoval
//!            ▲                            │                                   │
//!            └──── recovery (unwind) ─────┘                                   ▼
//!                                                                 stop pass: dropped
//!
//!   Terminated: overlay flag on Running / PendingRemoval members
//! ```
//!
//! ## Rules
//! - A handle is a member of at most one of `pending`, `running`, `pending_removal`.
//! - Handles are compared by [`DaemonKey`] (object address), never by identification.
//! - Nothing here calls into a daemon except [`Daemon::identification`].

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::config::SupervisorConfig;
use crate::core::heartbeat::HeartbeatRecord;
use crate::daemons::{Daemon, DaemonRef};
use crate::error::{DaemonFault, Phase, SupervisorError};

/// Identity of a daemon handle: the address of the daemon object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct DaemonKey(usize);

impl DaemonKey {
    pub(crate) fn of(daemon: &dyn Daemon) -> Self {
        Self((daemon as *const dyn Daemon).cast::<()>() as usize)
    }
}

/// Position of `key` in `list`.
fn position(list: &[DaemonRef], key: DaemonKey) -> Option<usize> {
    list.iter().position(|d| DaemonKey::of(d.as_ref()) == key)
}

/// Sorted identifications, for fault payloads.
pub(crate) fn identifications<'a>(daemons: impl IntoIterator<Item = &'a DaemonRef>) -> Vec<String> {
    let mut ids: Vec<String> = daemons
        .into_iter()
        .map(|d| d.identification().to_string())
        .collect();
    ids.sort_unstable();
    ids
}

/// Cached status report.
pub(crate) struct CachedInfo {
    pub(crate) text: String,
    pub(crate) generated: Instant,
}

/// All mutable supervisor state.
pub(crate) struct State {
    pub(crate) pending: Vec<DaemonRef>,
    pub(crate) running: Vec<DaemonRef>,
    pub(crate) pending_removal: Vec<DaemonRef>,
    pub(crate) terminated: HashSet<DaemonKey>,
    pub(crate) heartbeats: HashMap<DaemonKey, HeartbeatRecord>,
    pub(crate) faults: Vec<DaemonFault>,

    pub(crate) config: SupervisorConfig,
    /// `process` is between its pre-flight check and the end of its unwind.
    pub(crate) active: bool,
    /// `process` has begun its unwind; nothing new may be started.
    pub(crate) unwinding: bool,
    pub(crate) stop_requested: bool,
    /// Cancelled by `request_stop`; replaced when `process` returns.
    pub(crate) cancel: CancellationToken,

    pub(crate) created_at: DateTime<Local>,
    pub(crate) last_run: Option<DateTime<Local>>,
    pub(crate) info: Option<CachedInfo>,
}

impl State {
    pub(crate) fn new(config: SupervisorConfig) -> Self {
        Self {
            pending: Vec::new(),
            running: Vec::new(),
            pending_removal: Vec::new(),
            terminated: HashSet::new(),
            heartbeats: HashMap::new(),
            faults: Vec::new(),
            config,
            active: false,
            unwinding: false,
            stop_requested: false,
            cancel: CancellationToken::new(),
            created_at: Local::now(),
            last_run: None,
            info: None,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        match (self.active, self.stop_requested || self.unwinding) {
            (false, _) => Phase::Idle,
            (true, false) => Phase::Running,
            (true, true) => Phase::Stopping,
        }
    }

    /// Start passes may claim daemons: supervising and not unwinding.
    pub(crate) fn accepts_starts(&self) -> bool {
        self.active && !self.unwinding
    }

    /// Nothing left to stop: no running and no pending-removal daemons.
    pub(crate) fn is_settled(&self) -> bool {
        self.running.is_empty() && self.pending_removal.is_empty()
    }

    /// Fails with `WrongPhase` unless the supervisor is idle.
    pub(crate) fn require_idle(&self, operation: &'static str) -> Result<(), SupervisorError> {
        if self.active {
            return Err(SupervisorError::WrongPhase {
                operation,
                phase: self.phase(),
            });
        }
        Ok(())
    }

    /// Fails with `WrongPhase` unless `process` is running.
    pub(crate) fn require_active(&self, operation: &'static str) -> Result<(), SupervisorError> {
        if !self.active {
            return Err(SupervisorError::WrongPhase {
                operation,
                phase: self.phase(),
            });
        }
        Ok(())
    }

    /// Running or pending removal: under heartbeat supervision.
    pub(crate) fn is_tracked(&self, key: DaemonKey) -> bool {
        position(&self.running, key).is_some() || position(&self.pending_removal, key).is_some()
    }

    pub(crate) fn is_pending(&self, key: DaemonKey) -> bool {
        position(&self.pending, key).is_some()
    }

    /// Running and pending-removal daemons, in that order.
    pub(crate) fn supervised(&self) -> Vec<DaemonRef> {
        self.running
            .iter()
            .chain(self.pending_removal.iter())
            .cloned()
            .collect()
    }

    /// Replaces the pending set, dropping duplicate handles and the records of daemons
    /// that are no longer configured.
    pub(crate) fn replace_pending(&mut self, daemons: Vec<DaemonRef>) {
        let mut seen = HashSet::new();
        let mut pending = Vec::with_capacity(daemons.len());
        for d in daemons {
            if seen.insert(DaemonKey::of(d.as_ref())) {
                pending.push(d);
            }
        }
        for old in &self.pending {
            let key = DaemonKey::of(old.as_ref());
            if !seen.contains(&key) && !self.is_tracked(key) {
                self.heartbeats.remove(&key);
            }
        }
        self.pending = pending;
    }

    /// Inserts into pending unless the handle is already a member of any set.
    pub(crate) fn insert_pending(&mut self, daemon: DaemonRef) -> bool {
        let key = DaemonKey::of(daemon.as_ref());
        if self.is_pending(key) || self.is_tracked(key) {
            return false;
        }
        self.pending.push(daemon);
        true
    }

    /// Removes a never-started daemon from pending.
    pub(crate) fn take_pending(&mut self, key: DaemonKey) -> Option<DaemonRef> {
        let pos = position(&self.pending, key)?;
        self.heartbeats.remove(&key);
        Some(self.pending.remove(pos))
    }

    /// Moves a running daemon to pending removal.
    pub(crate) fn schedule_removal(&mut self, key: DaemonKey) -> Option<DaemonRef> {
        let pos = position(&self.running, key)?;
        let daemon = self.running.remove(pos);
        self.pending_removal.push(daemon.clone());
        Some(daemon)
    }

    /// Moves `daemon` from pending to running ahead of its `start()` call.
    ///
    /// Returns `Ok(false)` if another pass already claimed it (or it was removed).
    pub(crate) fn claim_for_start(&mut self, daemon: &DaemonRef) -> Result<bool, SupervisorError> {
        let key = DaemonKey::of(daemon.as_ref());
        let Some(pos) = position(&self.pending, key) else {
            return Ok(false);
        };
        if self.is_tracked(key) {
            return Err(SupervisorError::Consistency {
                details: format!(
                    "daemon {} is pending and supervised at the same time",
                    daemon.identification()
                ),
            });
        }
        let claimed = self.pending.remove(pos);
        self.terminated.remove(&key);
        self.running.push(claimed);
        Ok(true)
    }

    /// Drops a stopped daemon from pending removal along with its record.
    ///
    /// Returns `Some(was_terminated)` if it was a member.
    pub(crate) fn forget(&mut self, key: DaemonKey) -> Option<bool> {
        let pos = position(&self.pending_removal, key)?;
        self.pending_removal.remove(pos);
        self.heartbeats.remove(&key);
        Some(self.terminated.remove(&key))
    }

    /// Moves a stopped daemon from running back to pending with a reset record.
    ///
    /// Returns `Some(was_terminated)` if it was running.
    pub(crate) fn recover(&mut self, key: DaemonKey, now: Instant) -> Option<bool> {
        let pos = position(&self.running, key)?;
        let daemon = self.running.remove(pos);
        self.heartbeats
            .entry(key)
            .and_modify(|rec| rec.reset(now))
            .or_insert_with(|| HeartbeatRecord::new(now));
        self.pending.push(daemon);
        Some(self.terminated.remove(&key))
    }

    /// Adds a fault unless the same fault is already accumulated.
    pub(crate) fn record_fault(&mut self, fault: DaemonFault) -> bool {
        if self.faults.contains(&fault) {
            return false;
        }
        self.faults.push(fault);
        true
    }

    /// Atomically takes every accumulated fault, raising them if there were any.
    pub(crate) fn drain_faults(&mut self) -> Result<(), SupervisorError> {
        if self.faults.is_empty() {
            return Ok(());
        }
        let faults = std::mem::take(&mut self.faults);
        Err(SupervisorError::DaemonFaults { faults })
    }

    /// One heartbeat check over every supervised, non-terminated daemon.
    ///
    /// Returns the daemons whose miss counter exceeds `max_missed`, plus `(daemon, missed)`
    /// for each overdue daemon.
    pub(crate) fn sweep_heartbeats(
        &mut self,
        now: Instant,
        period: Duration,
        max_missed: u32,
    ) -> Result<(Vec<DaemonRef>, Vec<(DaemonRef, u32)>), SupervisorError> {
        let State {
            running,
            pending_removal,
            terminated,
            heartbeats,
            ..
        } = self;

        let mut exceeded = Vec::new();
        let mut overdue = Vec::new();
        for daemon in running.iter().chain(pending_removal.iter()) {
            let key = DaemonKey::of(daemon.as_ref());
            if terminated.contains(&key) {
                continue;
            }
            let Some(record) = heartbeats.get_mut(&key) else {
                return Err(SupervisorError::Consistency {
                    details: format!(
                        "supervised daemon {} has no heartbeat record",
                        daemon.identification()
                    ),
                });
            };
            let missed = record.check(now, period);
            if missed > 0 {
                overdue.push((daemon.clone(), missed));
            }
            if missed > max_missed {
                exceeded.push(daemon.clone());
            }
        }
        Ok((exceeded, overdue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemons::{DaemonContext, DaemonFn};
    use crate::error::DaemonError;

    fn daemon(name: &'static str) -> DaemonRef {
        DaemonFn::arc(name, |_ctx: DaemonContext| async {
            Ok::<(), DaemonError>(())
        })
    }

    #[test]
    fn insert_pending_rejects_known_handles() {
        let mut st = State::new(SupervisorConfig::default());
        let a = daemon("a");

        assert!(st.insert_pending(a.clone()));
        assert!(!st.insert_pending(a.clone()));

        assert!(st.claim_for_start(&a).unwrap());
        assert!(!st.insert_pending(a.clone()));
        assert!(st.pending.is_empty());
        assert_eq!(st.running.len(), 1);
    }

    #[test]
    fn same_name_different_handles_are_distinct() {
        let mut st = State::new(SupervisorConfig::default());
        assert!(st.insert_pending(daemon("twin")));
        assert!(st.insert_pending(daemon("twin")));
        assert_eq!(st.pending.len(), 2);
    }

    #[test]
    fn claim_detects_double_membership() {
        let mut st = State::new(SupervisorConfig::default());
        let a = daemon("a");
        st.running.push(a.clone());
        st.pending.push(a.clone());

        assert!(matches!(
            st.claim_for_start(&a),
            Err(SupervisorError::Consistency { .. })
        ));
    }

    #[test]
    fn recover_moves_back_to_pending_with_zero_misses() {
        let mut st = State::new(SupervisorConfig::default());
        let a = daemon("a");
        let key = DaemonKey::of(a.as_ref());
        let t0 = Instant::now();

        st.insert_pending(a.clone());
        st.heartbeats.insert(key, HeartbeatRecord::new(t0));
        st.claim_for_start(&a).unwrap();
        st.heartbeats
            .get_mut(&key)
            .unwrap()
            .check(t0 + Duration::from_secs(5), Duration::from_secs(1));
        st.terminated.insert(key);

        assert_eq!(st.recover(key, t0 + Duration::from_secs(6)), Some(true));
        assert!(st.is_pending(key));
        assert!(!st.is_tracked(key));
        assert!(!st.terminated.contains(&key));
        assert_eq!(st.heartbeats[&key].missed(), 0);
    }

    #[test]
    fn forget_drops_record() {
        let mut st = State::new(SupervisorConfig::default());
        let a = daemon("a");
        let key = DaemonKey::of(a.as_ref());

        st.insert_pending(a.clone());
        st.heartbeats.insert(key, HeartbeatRecord::new(Instant::now()));
        st.claim_for_start(&a).unwrap();
        assert!(st.schedule_removal(key).is_some());

        assert_eq!(st.forget(key), Some(false));
        assert!(st.heartbeats.is_empty());
        assert!(st.pending_removal.is_empty());
    }

    #[test]
    fn unwinding_reads_as_stopping_and_refuses_starts() {
        let mut st = State::new(SupervisorConfig::default());
        assert!(!st.accepts_starts());

        st.active = true;
        assert_eq!(st.phase(), Phase::Running);
        assert!(st.accepts_starts());

        st.unwinding = true;
        assert_eq!(st.phase(), Phase::Stopping);
        assert!(!st.accepts_starts());
    }

    #[test]
    fn drain_takes_everything_once() {
        let mut st = State::new(SupervisorConfig::default());
        let fault = DaemonFault::new("a", DaemonError::fail("x"));

        assert!(st.record_fault(fault.clone()));
        assert!(!st.record_fault(fault));
        assert!(st.record_fault(DaemonFault::new("b", DaemonError::fail("x"))));

        match st.drain_faults() {
            Err(SupervisorError::DaemonFaults { faults }) => assert_eq!(faults.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(st.drain_faults().is_ok());
    }

    #[test]
    fn sweep_skips_terminated_and_reports_exceeded() {
        let mut st = State::new(SupervisorConfig::default());
        let silent = daemon("silent");
        let done = daemon("done");
        let t0 = Instant::now();
        let period = Duration::from_millis(10);

        for d in [&silent, &done] {
            st.insert_pending(d.clone());
            st.heartbeats
                .insert(DaemonKey::of(d.as_ref()), HeartbeatRecord::new(t0));
            st.claim_for_start(d).unwrap();
        }
        st.terminated.insert(DaemonKey::of(done.as_ref()));

        let (exceeded, _) = st.sweep_heartbeats(t0 + period * 2, period, 1).unwrap();
        assert!(exceeded.is_empty());
        let (exceeded, overdue) = st.sweep_heartbeats(t0 + period * 3, period, 1).unwrap();
        assert_eq!(identifications(&exceeded), vec!["silent".to_string()]);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].1, 2);
    }
}
