//! # Randomized startup stagger.
//!
//! [`StartupDelay`] spreads daemon starts over a random delay in `[min, max]` so that a
//! batch of daemons does not hit shared downstream resources (connection pools, caches)
//! at the same instant.

use rand::Rng;
use std::time::Duration;

/// Uniform random delay between two consecutive daemon starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartupDelay {
    /// Lower bound (inclusive).
    pub min: Duration,
    /// Upper bound (inclusive).
    pub max: Duration,
}

impl Default for StartupDelay {
    /// Returns `100ms..=500ms`.
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_millis(500),
        }
    }
}

impl StartupDelay {
    /// Fixed delay (`min == max`).
    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    /// No delay at all.
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Returns true if `min <= max`.
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    /// Draws one delay from `[min, max]`.
    ///
    /// An inverted range yields `min`.
    pub fn sample(&self) -> Duration {
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        if max_ms <= min_ms {
            return self.min;
        }
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(min_ms..=max_ms))
    }
}
