//! # Supervisor: membership, the `process` loop, and its unwind.
//!
//! The [`Supervisor`] owns the daemon sets, heartbeat records and the fault accumulator
//! behind one lock, drives the supervision loop, and serves as the observer sink for its
//! daemons.
//!
//! ## High-level architecture
//! ```text
//! process():
//!   pre-flight: stop requested? ──► return Ok
//!   zombie check: alive in Pending? ──► StillRunning
//!   initial settle:
//!     stop removed daemons ─► start added daemons (staggered) ─► drain faults
//!   loop until stop requested:
//!     select { sleep_until(next_check), token.cancelled() }
//!     drain faults          ──► DaemonFaults
//!     heartbeat sweep       ──► MissingHeartbeats
//!   unwind (always; no new starts from here on):
//!     stop + forget PendingRemoval
//!     stop + recycle Running ─► Pending
//!     repeat until both sets are empty
//!   return first fault (loop before unwind)
//!
//! Daemon threads ── receive_heartbeat / terminated_* / exception_occurred ──► sink
//!                                         (same lock, any thread)
//! ```
//!
//! ## Rules
//! - The lock is never held across an `.await` or while calling into a daemon.
//! - Worker callbacks never fail; their faults surface at the next drain point.
//! - Faults raised by the loop always run the unwind before they propagate.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use daemonvisor::{DaemonContext, DaemonError, DaemonFn, Supervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = SupervisorConfig {
//!         check_period: Duration::from_millis(50),
//!         ..SupervisorConfig::default()
//!     };
//!     let sup = Supervisor::new(cfg)?;
//!
//!     sup.add_daemon(DaemonFn::arc("ticker", |ctx: DaemonContext| async move {
//!         loop {
//!             tokio::select! {
//!                 _ = ctx.cancelled() => return Ok::<_, DaemonError>(()),
//!                 _ = tokio::time::sleep(Duration::from_millis(10)) => ctx.heartbeat(),
//!             }
//!         }
//!     })).await?;
//!
//!     let stopper = sup.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(200)).await;
//!         stopper.request_stop();
//!     });
//!
//!     sup.process().await?;
//!     assert_eq!(sup.daemons()?.len(), 1);
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Local;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::config::SupervisorConfig;
use crate::core::heartbeat::HeartbeatRecord;
use crate::core::shutdown;
use crate::core::state::{DaemonKey, State, identifications};
use crate::daemons::{DaemonRef, ObserverRef};
use crate::error::{Phase, SupervisorError};
use crate::events::{Bus, Event, EventKind};

/// State shared between supervisor handles and registered as the daemons' observer.
pub(crate) struct Shared {
    state: Mutex<State>,
    pub(crate) bus: Bus,
}

impl Shared {
    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Supervises a configurable set of daemons.
///
/// Cloning yields another handle to the same supervisor; independent supervisors are
/// created with [`Supervisor::new`] or [`Supervisor::builder`].
#[derive(Clone)]
pub struct Supervisor {
    pub(crate) shared: Arc<Shared>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::from_valid_config(SupervisorConfig::default())
    }
}

impl Supervisor {
    /// Creates an idle supervisor with an empty pending set.
    pub fn new(cfg: SupervisorConfig) -> Result<Self, SupervisorError> {
        cfg.validate()?;
        Ok(Self::from_valid_config(cfg))
    }

    pub(crate) fn from_valid_config(cfg: SupervisorConfig) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::new(cfg)),
                bus,
            }),
        }
    }

    /// The sink registered on every started daemon.
    pub(crate) fn observer(&self) -> ObserverRef {
        self.shared.clone()
    }

    pub(crate) fn publish(&self, ev: Event) {
        self.shared.bus.publish(ev);
    }

    // ---------------------------
    // Configuration
    // ---------------------------

    /// Current configuration.
    pub fn config(&self) -> SupervisorConfig {
        self.shared.state().config.clone()
    }

    /// Replaces the configuration. Rejected while supervising.
    ///
    /// The event bus keeps the capacity it was created with.
    pub fn set_config(&self, cfg: SupervisorConfig) -> Result<(), SupervisorError> {
        cfg.validate()?;
        let mut st = self.shared.state();
        st.require_idle("set_config")?;
        st.config = cfg;
        st.info = None;
        Ok(())
    }

    // ---------------------------
    // Membership
    // ---------------------------

    /// Replaces the pending set wholesale.
    ///
    /// Fails with `WrongPhase` while supervising, and with `InvalidConfiguration` if any
    /// handle reports itself alive. Duplicate handles are kept once.
    pub fn set_daemons(&self, daemons: Vec<DaemonRef>) -> Result<(), SupervisorError> {
        self.shared.state().require_idle("set_daemons")?;

        let alive: Vec<&DaemonRef> = daemons.iter().filter(|d| d.is_alive()).collect();
        if !alive.is_empty() {
            return Err(SupervisorError::InvalidConfiguration {
                details: format!(
                    "daemons must not be alive when configured: {:?}",
                    identifications(alive)
                ),
            });
        }

        let mut st = self.shared.state();
        st.require_idle("set_daemons")?;
        st.replace_pending(daemons);
        st.info = None;
        debug!(pending = st.pending.len(), "daemon set replaced");
        Ok(())
    }

    /// The pending set. Fails with `WrongPhase` while supervising.
    pub fn daemons(&self) -> Result<Vec<DaemonRef>, SupervisorError> {
        let st = self.shared.state();
        st.require_idle("daemons")?;
        Ok(st.pending.clone())
    }

    /// Adds a daemon to the pending set.
    ///
    /// Returns `Ok(false)` if the handle is alive or already known. While supervising, the
    /// pending set is started right away instead of waiting for the next `process` call.
    /// Once the run is unwinding the daemon stays pending for the next run.
    pub async fn add_daemon(&self, daemon: DaemonRef) -> Result<bool, SupervisorError> {
        if daemon.is_alive() {
            warn!(daemon = %daemon.identification(), "refusing to add a daemon that is alive");
            return Ok(false);
        }

        let id = daemon.identification().to_string();
        let start_now = {
            let mut st = self.shared.state();
            if !st.insert_pending(daemon) {
                debug!(daemon = %id, "daemon already known");
                return Ok(false);
            }
            st.info = None;
            st.accepts_starts()
        };
        self.publish(Event::new(EventKind::DaemonAdded).with_daemon(id.as_str()));
        info!(daemon = %id, start_now, "daemon added");

        if start_now {
            self.start_added_daemons().await?;
        }
        Ok(true)
    }

    /// Removes a daemon.
    ///
    /// A pending daemon is dropped outright. A running daemon is scheduled for removal and,
    /// while supervising, stopped and joined right away. Returns whether the handle was
    /// found in either set.
    pub async fn remove_daemon(&self, daemon: &DaemonRef) -> bool {
        let key = DaemonKey::of(daemon.as_ref());
        let id = daemon.identification().to_string();

        let scheduled = {
            let mut st = self.shared.state();
            if st.take_pending(key).is_some() {
                st.info = None;
                drop(st);
                info!(daemon = %id, "pending daemon removed");
                self.publish(Event::new(EventKind::DaemonRemoved).with_daemon(id.as_str()));
                return true;
            }
            match st.schedule_removal(key) {
                Some(d) => {
                    st.info = None;
                    st.active.then_some(d)
                }
                None => {
                    debug!(daemon = %id, "remove requested for unknown daemon");
                    return false;
                }
            }
        };

        self.publish(Event::new(EventKind::DaemonRemoveRequested).with_daemon(id.as_str()));
        if let Some(d) = scheduled {
            self.remove_stopped(vec![d]).await;
        }
        true
    }

    /// Running and pending-removal daemons. Fails with `WrongPhase` unless supervising.
    pub fn running_daemons(&self) -> Result<Vec<DaemonRef>, SupervisorError> {
        let st = self.shared.state();
        st.require_active("running_daemons")?;
        Ok(st.supervised())
    }

    /// Number of running and pending-removal daemons. Fails with `WrongPhase` unless
    /// supervising.
    pub fn number_of_running_daemons(&self) -> Result<usize, SupervisorError> {
        let st = self.shared.state();
        st.require_active("number_of_running_daemons")?;
        Ok(st.running.len() + st.pending_removal.len())
    }

    /// Daemons scheduled for removal but not yet stopped.
    pub fn pending_removal_daemons(&self) -> Vec<DaemonRef> {
        self.shared.state().pending_removal.clone()
    }

    /// Copy of the daemon's heartbeat record, if it has one.
    pub fn heartbeat(&self, daemon: &DaemonRef) -> Option<HeartbeatRecord> {
        self.shared
            .state()
            .heartbeats
            .get(&DaemonKey::of(daemon.as_ref()))
            .copied()
    }

    /// Whether the daemon reported its own termination and awaits reaping.
    pub fn is_terminated(&self, daemon: &DaemonRef) -> bool {
        self.shared
            .state()
            .terminated
            .contains(&DaemonKey::of(daemon.as_ref()))
    }

    /// Calls `reconfigure()` on every running daemon. Failures are logged, not raised.
    ///
    /// Returns the number of daemons that reconfigured successfully.
    pub fn reconfigure_daemons(&self) -> Result<usize, SupervisorError> {
        let running = {
            let st = self.shared.state();
            st.require_active("reconfigure_daemons")?;
            st.running.clone()
        };
        let mut ok = 0;
        for d in &running {
            match d.reconfigure() {
                Ok(()) => ok += 1,
                Err(e) => warn!(daemon = %d.identification(), error = %e, "reconfigure failed"),
            }
        }
        Ok(ok)
    }

    // ---------------------------
    // Run control
    // ---------------------------

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.shared.state().phase()
    }

    /// Returns true while `process` is supervising.
    pub fn is_running(&self) -> bool {
        self.shared.state().active
    }

    /// Returns true if a stop was requested and not yet consumed by `process`.
    pub fn is_stop_requested(&self) -> bool {
        self.shared.state().stop_requested
    }

    /// Asks `process` to return. A sleeping loop wakes immediately.
    ///
    /// A request made while idle makes the next `process` call return without starting
    /// anything.
    pub fn request_stop(&self) {
        let mut st = self.shared.state();
        st.stop_requested = true;
        st.cancel.cancel();
        debug!("stop requested");
    }

    /// Receiver for supervisor events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Supervises the configured daemons until stopped or until a fatal fault.
    ///
    /// Whatever happens, every supervised daemon is stopped before this returns: daemons
    /// pending removal are dropped, running daemons are moved back to the pending set so a
    /// later call can start them again.
    pub async fn process(&self) -> Result<(), SupervisorError> {
        let (token, cfg) = {
            let mut st = self.shared.state();
            st.require_idle("process")?;
            if st.stop_requested {
                st.stop_requested = false;
                st.cancel = CancellationToken::new();
                info!("stop requested before supervision started");
                return Ok(());
            }
            st.active = true;
            st.last_run = Some(Local::now());
            st.info = None;
            (st.cancel.clone(), st.config.clone())
        };
        info!(
            check_period = ?cfg.check_period,
            max_missed = cfg.max_missed_heartbeats,
            grace = ?cfg.heartbeat_grace(),
            "supervision started"
        );
        self.publish(Event::new(EventKind::SupervisionStarted));

        let outcome = self.supervise(&token, &cfg).await;
        self.shared.state().unwinding = true;
        let unwound = self.unwind().await;

        {
            let mut st = self.shared.state();
            st.active = false;
            st.unwinding = false;
            st.stop_requested = false;
            st.cancel = CancellationToken::new();
            st.info = None;
        }

        let result = match (outcome, unwound) {
            (Err(e), Err(late)) => {
                error!(error = %late, "fault during unwind (superseded by loop fault)");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), late) => late,
        };

        let mut ev = Event::new(EventKind::SupervisionStopped);
        match &result {
            Ok(()) => info!("supervision stopped"),
            Err(e) => {
                error!(error = %e, "supervision aborted");
                ev = ev.with_reason(e.as_label());
            }
        }
        self.publish(ev);
        result
    }

    /// Runs [`process`](Self::process), requesting a stop on SIGINT, SIGTERM or SIGQUIT
    /// (Ctrl-C on other platforms).
    pub async fn process_until_signal(&self) -> Result<(), SupervisorError> {
        let stopper = self.clone();
        let watcher = tokio::spawn(async move {
            match shutdown::wait_for_shutdown_signal().await {
                Ok(signal) => {
                    info!(signal, "shutdown signal received");
                    stopper.request_stop();
                }
                Err(e) => warn!(error = %e, "cannot listen for shutdown signals"),
            }
        });
        let result = self.process().await;
        watcher.abort();
        result
    }

    async fn supervise(
        &self,
        token: &CancellationToken,
        cfg: &SupervisorConfig,
    ) -> Result<(), SupervisorError> {
        self.check_for_zombies()?;

        self.stop_removed_daemons().await;
        self.start_added_daemons().await?;
        self.shared.state().drain_faults()?;

        let period = cfg.check_period;
        let mut next_check = Instant::now() + period;
        while !token.is_cancelled() {
            tokio::select! {
                _ = time::sleep_until(next_check) => {}
                _ = token.cancelled() => break,
            }
            next_check += period;

            self.shared.state().drain_faults()?;
            self.check_heartbeats(cfg)?;
        }
        Ok(())
    }

    fn check_for_zombies(&self) -> Result<(), SupervisorError> {
        let pending = self.shared.state().pending.clone();
        let zombies: Vec<&DaemonRef> = pending.iter().filter(|d| d.is_alive()).collect();
        if zombies.is_empty() {
            return Ok(());
        }
        Err(SupervisorError::StillRunning {
            daemons: identifications(zombies),
        })
    }

    fn check_heartbeats(&self, cfg: &SupervisorConfig) -> Result<(), SupervisorError> {
        let (exceeded, overdue) = self.shared.state().sweep_heartbeats(
            Instant::now(),
            cfg.check_period,
            cfg.max_missed_heartbeats,
        )?;

        for (d, missed) in &overdue {
            debug!(
                daemon = %d.identification(),
                missed,
                grace = ?cfg.heartbeat_grace(),
                "heartbeat overdue"
            );
            self.publish(
                Event::new(EventKind::HeartbeatMissed)
                    .with_daemon(d.identification())
                    .with_missed(*missed),
            );
        }
        if exceeded.is_empty() {
            return Ok(());
        }
        Err(SupervisorError::MissingHeartbeats {
            daemons: identifications(&exceeded),
            max_missed: cfg.max_missed_heartbeats,
        })
    }

    async fn unwind(&self) -> Result<(), SupervisorError> {
        self.drain_supervised().await;
        self.shared.state().drain_faults()
    }
}
