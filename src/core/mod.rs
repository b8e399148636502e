//! Runtime core: supervision loop, membership state and lifecycle passes.
//!
//! The public API from this module is [`Supervisor`] with its [`SupervisorConfig`],
//! [`SupervisorBuilder`] and the [`HeartbeatRecord`] it exposes per daemon.
//!
//! Internal modules:
//! - [`supervisor`]: membership operations, the `process` loop and its unwind;
//! - [`lifecycle`]: ordered start pass and stop-and-join passes;
//! - [`sink`]: observer callbacks invoked from daemon threads;
//! - [`state`]: lifecycle sets, heartbeat records and the fault accumulator;
//! - [`report`]: cached status report;
//! - [`shutdown`]: OS termination signals.

mod builder;
mod config;
mod heartbeat;
mod lifecycle;
mod report;
mod shutdown;
mod sink;
mod state;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::SupervisorConfig;
pub use heartbeat::HeartbeatRecord;
pub use supervisor::Supervisor;
