//! # Supervisor configuration.
//!
//! Provides [`SupervisorConfig`], the scalar parameters of a supervisor. Values are fixed
//! for the duration of a `process` call; [`Supervisor::set_config`](crate::Supervisor::set_config)
//! is rejected while supervising.
//!
//! ## Sentinel values
//! - `info_ttl = 0s` → the status report is regenerated on every call
//! - `startup_delay = StartupDelay::none()` → daemons start back to back

use std::time::Duration;

use crate::error::SupervisorError;
use crate::policies::StartupDelay;

/// Configuration of a supervisor.
///
/// ## Field semantics
/// - `check_period`: interval between heartbeat checks (must be `> 0`)
/// - `join_timeout`: total time one stop pass waits for its daemons to terminate
/// - `max_missed_heartbeats`: consecutive misses tolerated before the loop aborts
/// - `startup_delay`: random stagger between consecutive starts (`min <= max`)
/// - `info_ttl`: how long a generated status report is served from cache
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug, PartialEq)]
pub struct SupervisorConfig {
    /// Interval between heartbeat checks.
    ///
    /// A daemon whose last heartbeat is older than one period counts one miss.
    pub check_period: Duration,

    /// Shared deadline for joining the daemons of one stop pass.
    ///
    /// Daemons joined later in a pass get correspondingly less time.
    pub join_timeout: Duration,

    /// Number of consecutive missed heartbeats tolerated.
    ///
    /// The loop aborts once a daemon's miss counter exceeds this value.
    pub max_missed_heartbeats: u32,

    /// Random delay between two consecutive daemon starts.
    pub startup_delay: StartupDelay,

    /// Time-to-live of the cached status report.
    pub info_ttl: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl SupervisorConfig {
    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), SupervisorError> {
        if self.check_period.is_zero() {
            return Err(SupervisorError::InvalidConfiguration {
                details: "check_period must be greater than zero".to_string(),
            });
        }
        if !self.startup_delay.is_valid() {
            return Err(SupervisorError::InvalidConfiguration {
                details: format!(
                    "startup delay min {:?} exceeds max {:?}",
                    self.startup_delay.min, self.startup_delay.max
                ),
            });
        }
        Ok(())
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Longest heartbeat silence tolerated before the loop aborts.
    #[inline]
    pub fn heartbeat_grace(&self) -> Duration {
        self.check_period
            .saturating_mul(self.max_missed_heartbeats.saturating_add(1))
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `check_period = 2s`
    /// - `join_timeout = 10s`
    /// - `max_missed_heartbeats = 5`
    /// - `startup_delay = 100ms..=500ms`
    /// - `info_ttl = 1s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            check_period: Duration::from_secs(2),
            join_timeout: Duration::from_secs(10),
            max_missed_heartbeats: 5,
            startup_delay: StartupDelay::default(),
            info_ttl: Duration::from_secs(1),
            bus_capacity: 1024,
        }
    }
}
