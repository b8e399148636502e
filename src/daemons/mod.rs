//! # Daemon abstractions.
//!
//! This module provides the daemon-facing types:
//! - [`Daemon`] - the control interface the supervisor drives
//! - [`DaemonObserver`] - the sink a daemon reports heartbeats and terminations to
//! - [`Observers`] - observer registry to embed in daemon implementations
//! - [`DaemonFn`] - function-backed daemon running on tokio

mod daemon;
mod daemon_fn;
mod observers;

pub use daemon::{Daemon, DaemonObserver, DaemonRef, ObserverRef};
pub use daemon_fn::{DaemonContext, DaemonFn};
pub use observers::Observers;
