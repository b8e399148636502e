//! # Worker control interface and observer sink contract.
//!
//! A [`Daemon`] is an opaque long-running worker. The supervisor drives it through a small
//! control surface (start / request stop / join / reconfigure / describe) and receives
//! liveness and termination signals through a [`DaemonObserver`] that the supervisor
//! registers on the daemon before starting it.
//!
//! ```text
//! Supervisor ── register_observer(sink) ──► Daemon
//!            ── start() ──────────────────► Daemon ── spawns its own task(s)
//!                                                           │
//!            ◄── receive_heartbeat(self) ───────────────────┤ (any thread)
//!            ◄── terminated_normally(self) ─────────────────┤
//!            ◄── terminated_exceptionally(self, cause) ─────┘
//! ```
//!
//! ## Rules
//! - Handles are shared as [`DaemonRef`]; identity is the address of the daemon object, so a
//!   daemon reports with `self` and the supervisor matches it to the handle it holds.
//! - `start()` and `request_stop()` must not block.
//! - `register_observer` should ignore an observer that is already registered.
//! - Observer methods never call back into the daemon synchronously, except
//!   [`DaemonObserver::exception_occurred`] which may call `request_stop()`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BoxError, DaemonError, DaemonFault};

/// Shared handle to a daemon.
pub type DaemonRef = Arc<dyn Daemon>;

/// Shared handle to an observer sink.
pub type ObserverRef = Arc<dyn DaemonObserver>;

/// # Long-running worker under supervision.
///
/// # Example
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use daemonvisor::{Daemon, DaemonError, ObserverRef, Observers};
///
/// #[derive(Default)]
/// struct Noop {
///     alive: AtomicBool,
///     observers: Observers,
/// }
///
/// #[async_trait]
/// impl Daemon for Noop {
///     fn identification(&self) -> &str { "noop" }
///     fn is_alive(&self) -> bool { self.alive.load(Ordering::Acquire) }
///     fn start(&self) -> Result<(), DaemonError> {
///         self.alive.store(true, Ordering::Release);
///         Ok(())
///     }
///     fn request_stop(&self) { self.alive.store(false, Ordering::Release); }
///     async fn join(&self, _timeout: Duration) -> Result<bool, DaemonError> {
///         Ok(!self.is_alive())
///     }
///     fn register_observer(&self, observer: ObserverRef) { self.observers.register(observer); }
///     fn unregister_observer(&self, observer: &ObserverRef) { self.observers.unregister(observer); }
/// }
/// ```
#[async_trait]
pub trait Daemon: Send + Sync + 'static {
    /// Stable, human-readable name used for logging and fault reports.
    fn identification(&self) -> &str;

    /// Whether the daemon's own task(s) are currently running.
    fn is_alive(&self) -> bool;

    /// Starts the daemon's task(s). Must return without waiting for them.
    fn start(&self) -> Result<(), DaemonError>;

    /// Asks the daemon to stop. Advisory; returns immediately.
    fn request_stop(&self);

    /// Waits up to `timeout` for the daemon to terminate.
    ///
    /// Returns `Ok(true)` when the daemon has terminated.
    async fn join(&self, timeout: Duration) -> Result<bool, DaemonError>;

    /// Re-reads the daemon's own settings. Best effort.
    fn reconfigure(&self) -> Result<(), DaemonError> {
        Ok(())
    }

    /// Free-form diagnostic text for the supervisor's status report.
    fn describe(&self) -> String {
        String::new()
    }

    /// Registers an observer that receives this daemon's signals.
    fn register_observer(&self, observer: ObserverRef);

    /// Removes a previously registered observer.
    fn unregister_observer(&self, observer: &ObserverRef);
}

/// # Inbound sink for daemon signals.
///
/// Every method may be called from any thread at any time, concurrently with supervision.
pub trait DaemonObserver: Send + Sync + 'static {
    /// Proof of forward progress.
    fn receive_heartbeat(&self, daemon: &dyn Daemon);

    /// The daemon finished without error.
    fn terminated_normally(&self, daemon: &dyn Daemon);

    /// The daemon finished because of `cause`.
    fn terminated_exceptionally(&self, daemon: &dyn Daemon, cause: BoxError);

    /// The daemon hit a fault but keeps running.
    fn exception_occurred(&self, daemon: &dyn Daemon, fault: DaemonFault);
}
