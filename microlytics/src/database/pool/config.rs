//! Pool configuration.

use std::time::Duration;

use microlytics_config::Pooling;

/// Pool limits and timeouts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Hard cap on live shard stores, idle and in-use combined.
    pub max_open: usize,
    /// Idle stores older than this are closed by the maintenance task.
    pub idle_timeout: Duration,
    /// How long an acquire waits before giving up.
    pub checkout_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_open: 1000,
            idle_timeout: Duration::from_secs(60),
            checkout_timeout: Duration::from_millis(5_000),
        }
    }
}

impl From<&Pooling> for Config {
    fn from(pooling: &Pooling) -> Self {
        Self {
            max_open: pooling.max_open,
            idle_timeout: pooling.idle_timeout_duration(),
            checkout_timeout: pooling.checkout_timeout_duration(),
        }
    }
}
