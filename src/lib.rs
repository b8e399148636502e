//! # daemonvisor
//!
//! **Daemonvisor** supervises a set of long-running workers ("daemons").
//!
//! It starts them in order with a random stagger, watches their heartbeats, collects the
//! faults they report, and stops them (with a bounded join) when supervision ends. Daemons
//! that were running are recycled back to the pending set so the next run can start them
//! again.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Daemon    │   │    Daemon    │   │    Daemon    │
//!     │ (worker #1)  │   │ (worker #2)  │   │ (worker #3)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ start / request_stop / join / describe (control calls)
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - Pending / Running / PendingRemoval sets (+ Terminated flag)    │
//! │  - HeartbeatRecord per supervised daemon                          │
//! │  - Fault accumulator (deduplicated, drained atomically)           │
//! │  - Bus (broadcast events)                                         │
//! └──────▲──────────────────▲──────────────────▲──────────────────────┘
//!        │ receive_heartbeat / terminated_* / exception_occurred
//!        │ (DaemonObserver, called from daemon threads)
//!     worker #1          worker #2          worker #3
//! ```
//!
//! ### Lifecycle
//! ```text
//! process():
//!   ├─► stop requested already? ─► return Ok
//!   ├─► alive handle in Pending? ─► StillRunning
//!   ├─► stop PendingRemoval, start Pending (staggered), drain faults
//!   ├─► loop every check_period (wakes early on request_stop):
//!   │       ├─ drain faults      ─► DaemonFaults
//!   │       └─ heartbeat sweep   ─► MissingHeartbeats
//!   └─► unwind: stop + drop PendingRemoval, stop + recycle Running ─► Pending
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                         |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Supervision**   | Run, stop, add and remove daemons.                           | [`Supervisor`], [`SupervisorBuilder`]      |
//! | **Daemons**       | Control contract and the observer sink daemons report to.    | [`Daemon`], [`DaemonObserver`]             |
//! | **Function daemons** | Async closures supervised as daemons.                     | [`DaemonFn`], [`DaemonContext`]            |
//! | **Errors**        | Supervisor fault taxonomy and daemon-side errors.            | [`SupervisorError`], [`DaemonError`], [`DaemonFault`] |
//! | **Events**        | Broadcast of lifecycle events.                               | [`Event`], [`EventKind`], [`Bus`]          |
//! | **Configuration** | Check period, join timeout, thresholds, startup stagger.     | [`SupervisorConfig`], [`StartupDelay`]     |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use daemonvisor::{
//!     DaemonContext, DaemonError, DaemonFn, StartupDelay, Supervisor, SupervisorConfig,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = SupervisorConfig {
//!         check_period: Duration::from_millis(50),
//!         startup_delay: StartupDelay::none(),
//!         ..SupervisorConfig::default()
//!     };
//!
//!     let worker = DaemonFn::arc("worker", |ctx: DaemonContext| async move {
//!         while !ctx.is_cancelled() {
//!             ctx.heartbeat();
//!             tokio::time::sleep(Duration::from_millis(10)).await;
//!         }
//!         Ok::<_, DaemonError>(())
//!     });
//!
//!     let sup = Supervisor::builder(cfg).with_daemon(worker).build()?;
//!
//!     let stopper = sup.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(200)).await;
//!         stopper.request_stop();
//!     });
//!
//!     sup.process().await?;
//!     Ok(())
//! }
//! ```

mod core;
mod daemons;
mod error;
mod events;
mod policies;

// ---- Public re-exports ----

pub use core::{HeartbeatRecord, Supervisor, SupervisorBuilder, SupervisorConfig};
pub use daemons::{
    Daemon, DaemonContext, DaemonFn, DaemonObserver, DaemonRef, ObserverRef, Observers,
};
pub use error::{BoxError, DaemonError, DaemonFault, Phase, SupervisorError};
pub use events::{Bus, Event, EventKind};
pub use policies::StartupDelay;
