//! Shard store pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{lock_api::MutexGuard, Mutex, RawMutex};
use tokio::task::spawn_blocking;
use tokio::time::{sleep, timeout, Instant};
use tracing::{error, warn};

use crate::database::store::{self, Store};

use super::{Comms, Config, Error, Guard, Inner, Monitor, Request, Slot, Waiting};

/// Admission decision taken under the lock; acted on outside it.
enum Admission {
    Take(Box<Store>),
    Create { evicted: Option<Box<Store>> },
    Wait(Waiting),
}

/// Releases a `pending` entry if the creating acquire never finishes,
/// e.g. when the checkout timeout cancels it mid-open. Disarmed once
/// the slot is registered.
struct Reservation {
    pool: Pool,
    path: PathBuf,
    armed: bool,
}

impl Reservation {
    fn new(pool: Pool, path: PathBuf) -> Self {
        Self {
            pool,
            path,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            let mut guard = self.pool.lock();
            guard.pending.remove(&self.path);
            guard.wake_one();
        }
    }
}

/// Cloneable handle to the shard store pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<InnerSync>,
}

pub(crate) struct InnerSync {
    pub(super) inner: Mutex<Inner>,
    pub(super) comms: Comms,
    pub(super) config: Config,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("state", &self.state()).finish()
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State {
    pub idle: usize,
    pub in_use: usize,
    pub pending: usize,
    pub waiting: usize,
    pub online: bool,
    pub evictions: usize,
}

impl Pool {
    /// Create a new pool. Offline until [`Pool::launch`].
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(InnerSync {
                inner: Mutex::new(Inner::new(config)),
                comms: Comms::default(),
                config,
            }),
        }
    }

    /// Bring the pool online and start the maintenance task.
    pub fn launch(&self) {
        let mut guard = self.lock();
        if !guard.online {
            guard.online = true;
            Monitor::run(self);
        }
    }

    /// Check out the store for a shard path. Blocks while the store
    /// is held elsewhere or the pool is at capacity with nothing to
    /// evict; the whole call is bounded by the checkout timeout.
    pub async fn get(&self, request: &Request) -> Result<Guard, Error> {
        match timeout(self.config().checkout_timeout, self.get_internal(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::CheckoutTimeout),
        }
    }

    async fn get_internal(&self, request: &Request) -> Result<Guard, Error> {
        loop {
            let admission = {
                let mut guard = self.lock();

                if !guard.online {
                    return Err(Error::Offline);
                }

                if let Some(store) = guard.take(&request.path) {
                    Admission::Take(store)
                } else if guard.slots.contains_key(&request.path)
                    || guard.pending.contains(&request.path)
                {
                    // The store exists but is busy, or is being
                    // opened. Its checkin will hand it over.
                    Admission::Wait(Waiting::new(&mut guard, &request.path))
                } else if guard.total() < guard.config.max_open {
                    guard.pending.insert(request.path.clone());
                    Admission::Create { evicted: None }
                } else {
                    match guard.lru_idle() {
                        Some(lru) => {
                            let evicted = guard.evict(&lru);
                            guard.pending.insert(request.path.clone());
                            Admission::Create { evicted }
                        }
                        None => Admission::Wait(Waiting::new(&mut guard, &request.path)),
                    }
                }
            };

            match admission {
                Admission::Take(store) => {
                    return Ok(Guard::new(self.clone(), request.path.clone(), store));
                }

                Admission::Create { evicted } => {
                    drop(evicted);

                    let reservation =
                        Reservation::new(self.clone(), request.path.clone());

                    let store = self.open_store(&request.path).await?;

                    {
                        let mut guard = self.lock();
                        guard.pending.remove(&request.path);

                        if !guard.online {
                            return Err(Error::Offline);
                        }

                        guard.slots.insert(request.path.clone(), Slot::InUse);
                    }

                    reservation.disarm();
                    return Ok(Guard::new(self.clone(), request.path.clone(), store));
                }

                Admission::Wait(waiting) => match waiting.wait().await? {
                    Some(store) => {
                        return Ok(Guard::new(self.clone(), request.path.clone(), store));
                    }
                    // Capacity may have freed up; retry admission.
                    None => continue,
                },
            }
        }
    }

    /// Open and initialize a shard store, creating the shard
    /// directory first.
    async fn open_store(&self, path: &Path) -> Result<Box<Store>, Error> {
        let path = path.to_path_buf();

        let result = spawn_blocking(move || -> Result<Box<Store>, store::Error> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let store = Store::open(&path)?;
            store.init_schema()?;

            Ok(Box::new(store))
        })
        .await;

        match result {
            Ok(Ok(store)) => Ok(store),
            Ok(Err(err)) => {
                error!("error opening shard store: {}", err);
                Err(Error::Storage)
            }
            Err(err) => {
                error!("shard store open task failed: {}", err);
                Err(Error::Storage)
            }
        }
    }

    /// Check a store back in. Hands it to a waiter for the same path
    /// when one is parked; drops it when the pool went offline or the
    /// tenant was deleted while it was out.
    pub(super) fn checkin(&self, path: &Path, store: Box<Store>) {
        let mut store = store;

        let closed = {
            let mut guard = self.lock();

            if !guard.online || guard.note_expired(path) {
                guard.slots.remove(path);
                guard.wake_one();
                Some(store)
            } else {
                while let Some(waiter) = guard.same_path_waiter(path) {
                    match waiter.tx.send(Ok(Some(store))) {
                        // Slot stays in use, now owned by the waiter.
                        Ok(()) => return,
                        Err(payload) => match payload {
                            // Waiter gave up; reclaim and try the next.
                            Ok(Some(reclaimed)) => store = reclaimed,
                            _ => return,
                        },
                    }
                }

                guard.idle_slot(path.to_path_buf(), store, Instant::now());
                guard.wake_one();
                None
            }
        };

        drop(closed);
    }

    /// Close idle stores past the idle timeout. Returns how many were
    /// closed. Called by the monitor.
    pub(super) fn reap_idle(&self, cap: usize) -> usize {
        let closed = { self.lock().close_idle(Instant::now(), cap) };
        let count = closed.len();
        drop(closed);

        if count > 0 {
            let mut guard = self.lock();
            for _ in 0..count {
                guard.wake_one();
            }
        }

        count
    }

    /// Evict everything under a deleted tenant directory. Idle stores
    /// close now; checked-out ones close at checkin.
    pub fn expire_prefix(&self, prefix: &Path) {
        let closed = { self.lock().expire_prefix(prefix) };
        let count = closed.len();
        drop(closed);

        if count > 0 {
            let mut guard = self.lock();
            for _ in 0..count {
                guard.wake_one();
            }
        }
    }

    /// Drain the pool: idle stores close immediately, waiters fail,
    /// and checked-out stores are waited on until the deadline.
    pub async fn shutdown(&self, deadline: Duration) {
        let idle = {
            let mut guard = self.lock();
            guard.online = false;
            guard.close_waiters(Error::Offline);
            guard.dump_idle()
        };
        drop(idle);

        self.comms().shutdown.notify_one();

        let started = Instant::now();
        while started.elapsed() < deadline {
            if self.lock().slots.is_empty() {
                return;
            }

            sleep(Duration::from_millis(100)).await;
        }

        let remaining = self.lock().slots.len();
        if remaining > 0 {
            warn!(
                "shutdown deadline reached with {} shard stores still checked out",
                remaining
            );
        }
    }

    /// Pool counters, for logging and tests.
    pub fn state(&self) -> State {
        let guard = self.lock();

        State {
            idle: guard.idle(),
            in_use: guard.in_use(),
            pending: guard.pending.len(),
            waiting: guard.waiting.len(),
            online: guard.online,
            evictions: guard.evictions,
        }
    }

    /// Pool exclusive lock.
    #[inline]
    pub(super) fn lock(&self) -> MutexGuard<'_, RawMutex, Inner> {
        self.inner.inner.lock()
    }

    /// Internal notifications.
    #[inline]
    pub(super) fn comms(&self) -> &Comms {
        &self.inner.comms
    }

    /// Pool configuration.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}
