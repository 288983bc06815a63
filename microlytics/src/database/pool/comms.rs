//! Internal pool notifications.

use tokio::sync::Notify;

/// Signals shared between the pool handle and its maintenance task.
#[derive(Default, Debug)]
pub(super) struct Comms {
    /// Fired once on shutdown; observed by the monitor.
    pub(super) shutdown: Notify,
}
