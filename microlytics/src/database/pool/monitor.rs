//! Pool maintenance task.

use std::time::Duration;

use tokio::select;
use tokio::spawn;
use tokio::time::interval;
use tracing::debug;

use super::Pool;

/// How often idle stores are considered for eviction.
const TICK: Duration = Duration::from_secs(5);

/// Evictions per tick are capped to bound the time spent holding the
/// pool lock.
const MAX_EVICTIONS_PER_TICK: usize = 15;

/// Closes shard stores that have sat idle past the configured
/// timeout. One monitor runs per pool, stopped via `Comms::shutdown`.
pub(super) struct Monitor {
    pool: Pool,
}

impl Monitor {
    /// Run the pool monitor.
    pub(super) fn run(pool: &Pool) {
        let monitor = Self { pool: pool.clone() };

        spawn(async move { monitor.spawn().await });
    }

    async fn spawn(self) {
        let mut maintenance = interval(TICK);

        debug!("pool monitor running");

        loop {
            select! {
                _ = maintenance.tick() => {}
                _ = self.pool.comms().shutdown.notified() => break,
            }

            let closed = self.pool.reap_idle(MAX_EVICTIONS_PER_TICK);
            if closed > 0 {
                debug!("closed {} idle shard stores", closed);
            }
        }

        debug!("pool monitor shutdown");
    }
}
