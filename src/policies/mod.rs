//! Startup policies.
//!
//! ## Contents
//! - [`StartupDelay`] randomized stagger between consecutive daemon starts
//!
//! ## Quick wiring
//! ```text
//! SupervisorConfig { startup_delay: StartupDelay, .. }
//!      └─► core ordered start: start(d0) → sleep(sample()) → start(d1) → ... → start(dN)
//! ```

mod stagger;

pub use stagger::StartupDelay;
