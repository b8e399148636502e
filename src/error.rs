//! Error types used by the daemonvisor runtime and by daemons.
//!
//! This module defines three types:
//!
//! - [`SupervisorError`]: faults raised by the supervisor itself (the fault taxonomy).
//! - [`DaemonError`]: errors raised by daemon control operations (`start`, `join`, ...).
//! - [`DaemonFault`]: a daemon-caused fault record collected by the fault accumulator.
//!
//! [`SupervisorError`] and [`DaemonError`] provide helper methods (`as_label`, `as_message`)
//! for logging/metrics.

use std::error::Error as StdError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use thiserror::Error;

/// Boxed cause reported by a daemon through the observer sink.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Lifecycle phase of a supervisor, as seen by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// `process` is not running.
    Idle,
    /// `process` is supervising daemons.
    Running,
    /// `process` is running but a stop has been requested.
    Stopping,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
        })
    }
}

/// # Faults produced by the supervisor.
///
/// Faults raised inside [`Supervisor::process`](crate::Supervisor::process) always run the
/// unwind sequence (stop, join, recycle) before they reach the caller.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The pending set contains daemons that report themselves alive.
    #[error("pending daemons are still running: {daemons:?}")]
    StillRunning {
        /// Identifications of the offending daemons.
        daemons: Vec<String>,
    },

    /// One or more supervised daemons exceeded the missed-heartbeat threshold.
    #[error("daemons missed more than {max_missed} consecutive heartbeats: {daemons:?}")]
    MissingHeartbeats {
        /// Identifications of the offending daemons.
        daemons: Vec<String>,
        /// The configured threshold.
        max_missed: u32,
    },

    /// Daemons reported faults since the last drain.
    #[error("{} daemon fault(s) reported: {}", .faults.len(), summarize(.faults))]
    DaemonFaults {
        /// Every accumulated fault, deduplicated by identity.
        faults: Vec<DaemonFault>,
    },

    /// A daemon was asked to start while it reports itself alive.
    #[error("daemon {daemon} is already running")]
    AlreadyRunning {
        /// Identification of the daemon.
        daemon: String,
    },

    /// An operation was invoked in the wrong lifecycle phase.
    #[error("{operation} is not allowed while the supervisor is {phase}")]
    WrongPhase {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Phase the supervisor was in.
        phase: Phase,
    },

    /// The membership sets violate their invariants.
    #[error("membership consistency violated: {details}")]
    Consistency {
        /// What was found.
        details: String,
    },

    /// The configuration or the supplied daemon set is unusable.
    #[error("invalid configuration: {details}")]
    InvalidConfiguration {
        /// What was rejected.
        details: String,
    },
}

fn summarize(faults: &[DaemonFault]) -> String {
    faults
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use daemonvisor::SupervisorError;
    ///
    /// let err = SupervisorError::StillRunning { daemons: vec!["indexer".into()] };
    /// assert_eq!(err.as_label(), "supervisor_still_running");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::StillRunning { .. } => "supervisor_still_running",
            SupervisorError::MissingHeartbeats { .. } => "supervisor_missing_heartbeats",
            SupervisorError::DaemonFaults { .. } => "supervisor_daemon_faults",
            SupervisorError::AlreadyRunning { .. } => "supervisor_already_running",
            SupervisorError::WrongPhase { .. } => "supervisor_wrong_phase",
            SupervisorError::Consistency { .. } => "supervisor_consistency",
            SupervisorError::InvalidConfiguration { .. } => "supervisor_invalid_configuration",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SupervisorError::StillRunning { daemons } => {
                format!("still running: {daemons:?}")
            }
            SupervisorError::MissingHeartbeats { daemons, max_missed } => {
                format!("missing heartbeats (max {max_missed}): {daemons:?}")
            }
            SupervisorError::DaemonFaults { faults } => {
                format!("daemon faults: {}", summarize(faults))
            }
            SupervisorError::AlreadyRunning { daemon } => format!("already running: {daemon}"),
            SupervisorError::WrongPhase { operation, phase } => {
                format!("wrong phase: {operation} while {phase}")
            }
            SupervisorError::Consistency { details } => format!("consistency: {details}"),
            SupervisorError::InvalidConfiguration { details } => {
                format!("invalid configuration: {details}")
            }
        }
    }

    /// Indicates a programming error rather than a runtime condition.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            SupervisorError::WrongPhase { .. }
                | SupervisorError::Consistency { .. }
                | SupervisorError::InvalidConfiguration { .. }
        )
    }
}

/// # Errors produced by daemon control operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DaemonError {
    /// The operation failed.
    #[error("daemon operation failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// A blocking wait (usually `join`) was interrupted.
    #[error("interrupted")]
    Interrupted,

    /// The daemon body panicked.
    #[error("daemon panicked: {info}")]
    Panicked {
        /// Panic payload, when it was a string.
        info: String,
    },
}

impl DaemonError {
    /// Convenience constructor for [`DaemonError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        DaemonError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DaemonError::Fail { .. } => "daemon_failed",
            DaemonError::Interrupted => "daemon_interrupted",
            DaemonError::Panicked { .. } => "daemon_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DaemonError::Fail { error } => format!("failed: {error}"),
            DaemonError::Interrupted => "interrupted".to_string(),
            DaemonError::Panicked { info } => format!("panicked: {info}"),
        }
    }
}

/// A fault caused by a specific daemon.
///
/// Two faults are equal only when they share the same underlying cause instance; cloning a
/// fault keeps it equal to the original. The fault accumulator relies on this to deduplicate
/// a fault that is reported more than once.
#[derive(Clone)]
pub struct DaemonFault {
    daemon: Arc<str>,
    cause: Arc<dyn StdError + Send + Sync + 'static>,
}

impl DaemonFault {
    /// Creates a fault for `daemon` with a fresh identity.
    pub fn new(daemon: impl Into<Arc<str>>, cause: impl Into<BoxError>) -> Self {
        Self {
            daemon: daemon.into(),
            cause: Arc::from(cause.into()),
        }
    }

    /// Wraps `cause` into a fault, unless it already is one.
    pub fn wrap(daemon: impl Into<Arc<str>>, cause: BoxError) -> Self {
        match cause.downcast::<DaemonFault>() {
            Ok(fault) => *fault,
            Err(cause) => Self {
                daemon: daemon.into(),
                cause: Arc::from(cause),
            },
        }
    }

    /// Identification of the daemon that caused the fault.
    pub fn daemon(&self) -> &str {
        &self.daemon
    }

    /// The underlying cause.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    fn identity(&self) -> *const () {
        Arc::as_ptr(&self.cause).cast::<()>()
    }
}

impl fmt::Debug for DaemonFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonFault")
            .field("daemon", &self.daemon)
            .field("cause", &self.cause.to_string())
            .finish()
    }
}

impl fmt::Display for DaemonFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.daemon, self.cause)
    }
}

impl StdError for DaemonFault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.cause.as_ref())
    }
}

impl PartialEq for DaemonFault {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.identity(), other.identity())
    }
}

impl Eq for DaemonFault {}

impl Hash for DaemonFault {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let fault = DaemonFault::new("indexer", DaemonError::fail("disk full"));
        assert_eq!(fault, fault.clone());
    }

    #[test]
    fn equal_messages_are_distinct_faults() {
        let a = DaemonFault::new("indexer", DaemonError::fail("disk full"));
        let b = DaemonFault::new("indexer", DaemonError::fail("disk full"));
        assert_ne!(a, b);
    }

    #[test]
    fn daemon_error_helpers() {
        let err = DaemonError::Panicked {
            info: "index out of bounds".into(),
        };
        assert_eq!(err.as_label(), "daemon_panicked");
        assert_eq!(err.as_message(), "panicked: index out of bounds");
        assert_eq!(DaemonError::fail("disk").as_message(), "failed: disk");
        assert_eq!(DaemonError::Interrupted.as_message(), "interrupted");
    }

    #[test]
    fn wrap_keeps_existing_fault() {
        let fault = DaemonFault::new("indexer", DaemonError::Interrupted);
        let wrapped = DaemonFault::wrap("other", Box::new(fault.clone()));
        assert_eq!(wrapped, fault);
        assert_eq!(wrapped.daemon(), "indexer");
    }

    #[test]
    fn wrap_boxes_foreign_cause() {
        let wrapped = DaemonFault::wrap("mailer", Box::new(DaemonError::fail("smtp down")));
        assert_eq!(wrapped.daemon(), "mailer");
        assert_eq!(wrapped.to_string(), "mailer: daemon operation failed: smtp down");
    }

    #[test]
    fn collection_message_lists_every_fault() {
        let err = SupervisorError::DaemonFaults {
            faults: vec![
                DaemonFault::new("a", DaemonError::fail("one")),
                DaemonFault::new("b", DaemonError::fail("two")),
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 daemon fault(s) reported: a: daemon operation failed: one; b: daemon operation failed: two"
        );
        assert_eq!(err.as_label(), "supervisor_daemon_faults");
    }

    #[test]
    fn wrong_phase_names_the_phase() {
        let err = SupervisorError::WrongPhase {
            operation: "set_daemons",
            phase: Phase::Running,
        };
        assert_eq!(
            err.to_string(),
            "set_daemons is not allowed while the supervisor is running"
        );
        assert!(err.is_misuse());
    }
}
