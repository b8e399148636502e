//! # Supervisor builder.
//!
//! Collects a configuration and an initial daemon set, validates both, and returns an idle
//! [`Supervisor`].
//!
//! ```rust
//! use daemonvisor::{DaemonContext, DaemonError, DaemonFn, Supervisor, SupervisorConfig};
//!
//! let sup = Supervisor::builder(SupervisorConfig::default())
//!     .with_daemons(vec![DaemonFn::arc("idle", |_ctx: DaemonContext| async {
//!         Ok::<(), DaemonError>(())
//!     })])
//!     .build()
//!     .unwrap();
//! assert_eq!(sup.daemons().unwrap().len(), 1);
//! ```

use crate::core::config::SupervisorConfig;
use crate::core::supervisor::Supervisor;
use crate::daemons::DaemonRef;
use crate::error::SupervisorError;

/// Builder for constructing a [`Supervisor`] with an initial daemon set.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    daemons: Vec<DaemonRef>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            daemons: Vec::new(),
        }
    }

    /// Sets the initial pending set.
    pub fn with_daemons(mut self, daemons: Vec<DaemonRef>) -> Self {
        self.daemons = daemons;
        self
    }

    /// Appends one daemon to the initial pending set.
    pub fn with_daemon(mut self, daemon: DaemonRef) -> Self {
        self.daemons.push(daemon);
        self
    }

    /// Builds the supervisor.
    ///
    /// Fails with `InvalidConfiguration` if the configuration is invalid or any daemon
    /// reports itself alive.
    pub fn build(self) -> Result<Supervisor, SupervisorError> {
        let sup = Supervisor::new(self.cfg)?;
        if !self.daemons.is_empty() {
            sup.set_daemons(self.daemons)?;
        }
        Ok(sup)
    }
}

impl Supervisor {
    /// Starts building a supervisor.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn invalid_config_is_rejected() {
        let res = Supervisor::builder(SupervisorConfig {
            check_period: Duration::ZERO,
            ..SupervisorConfig::default()
        })
        .build();
        assert!(matches!(
            res,
            Err(SupervisorError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn empty_builder_yields_idle_supervisor() {
        let sup = Supervisor::builder(SupervisorConfig::default()).build().unwrap();
        assert!(!sup.is_running());
        assert!(sup.daemons().unwrap().is_empty());
    }
}
