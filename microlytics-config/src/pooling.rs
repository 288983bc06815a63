use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shard store pool sizing and timeouts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Pooling {
    /// Hard cap on open shard stores across all tenants.
    ///
    /// _Default:_ `1000`
    #[serde(default = "Pooling::max_open")]
    pub max_open: usize,

    /// Idle stores older than this many seconds are closed
    /// by the pool maintenance task.
    ///
    /// _Default:_ `60`
    #[serde(default = "Pooling::idle_timeout")]
    pub idle_timeout: u64,

    /// How long an acquire waits for a free slot before giving up,
    /// in milliseconds.
    ///
    /// _Default:_ `5000`
    #[serde(default = "Pooling::checkout_timeout")]
    pub checkout_timeout: u64,
}

impl Pooling {
    fn max_open() -> usize {
        1000
    }

    fn idle_timeout() -> u64 {
        60
    }

    fn checkout_timeout() -> u64 {
        5_000
    }

    /// Idle timeout duration.
    pub fn idle_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    /// Checkout timeout duration.
    pub fn checkout_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout)
    }
}

impl Default for Pooling {
    fn default() -> Self {
        Self {
            max_open: Self::max_open(),
            idle_timeout: Self::idle_timeout(),
            checkout_timeout: Self::checkout_timeout(),
        }
    }
}
