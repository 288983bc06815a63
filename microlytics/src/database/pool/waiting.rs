//! Parked checkout requests.

use std::path::{Path, PathBuf};

use tokio::sync::oneshot::{channel, Receiver, Sender};

use crate::database::store::Store;

use super::{Error, Inner};

/// A send of `Ok(Some(store))` hands the store for the waiter's path
/// over directly; `Ok(None)` tells the waiter to retry admission.
pub(super) type Handoff = Result<Option<Box<Store>>, Error>;

pub(super) struct Waiter {
    pub(super) path: PathBuf,
    pub(super) tx: Sender<Handoff>,
}

/// Receiving side, held by the blocked acquire.
pub(super) struct Waiting {
    rx: Receiver<Handoff>,
}

impl Waiting {
    /// Park a request. Must be called under the pool lock.
    pub(super) fn new(inner: &mut Inner, path: &Path) -> Self {
        let (tx, rx) = channel();

        inner.waiting.push_back(Waiter {
            path: path.to_path_buf(),
            tx,
        });

        Self { rx }
    }

    pub(super) async fn wait(self) -> Handoff {
        match self.rx.await {
            Ok(handoff) => handoff,
            // Sender dropped without an answer: the pool went away.
            Err(_) => Err(Error::Offline),
        }
    }
}
