//! Pool internals synchronized with a mutex.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tokio::time::Instant;

use crate::database::store::Store;

use super::{Config, Error, Waiter};

/// State of one open shard path.
pub(super) enum Slot {
    Idle {
        store: Box<Store>,
        idle_since: Instant,
    },
    InUse,
}

/// Registry protected by the pool mutex.
pub(super) struct Inner {
    /// One slot per open shard path. Per-shard exclusion falls out of
    /// this: a path is either idle, or checked out exactly once.
    pub(super) slots: HashMap<PathBuf, Slot>,
    /// Paths whose store is currently being opened.
    pub(super) pending: HashSet<PathBuf>,
    /// Requests parked until their store returns or a slot frees up.
    pub(super) waiting: VecDeque<Waiter>,
    /// Deleted tenant subtrees with stores still checked out. Their
    /// checkins drop the store instead of pooling it. The count
    /// tracks outstanding handles so recreated tenants pool again.
    expired: HashMap<PathBuf, usize>,
    pub(super) online: bool,
    pub(super) config: Config,
    /// Stores closed over the pool lifetime.
    pub(super) evictions: usize,
}

impl Inner {
    pub(super) fn new(config: Config) -> Self {
        Self {
            slots: HashMap::new(),
            pending: HashSet::new(),
            waiting: VecDeque::new(),
            expired: HashMap::new(),
            online: false,
            config,
            evictions: 0,
        }
    }

    /// Live handles: open slots plus stores mid-open.
    #[inline]
    pub(super) fn total(&self) -> usize {
        self.slots.len() + self.pending.len()
    }

    #[inline]
    pub(super) fn idle(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Idle { .. }))
            .count()
    }

    #[inline]
    pub(super) fn in_use(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::InUse))
            .count()
    }

    /// Check the store for `path` out of the idle slot, if any.
    pub(super) fn take(&mut self, path: &Path) -> Option<Box<Store>> {
        if !matches!(self.slots.get(path), Some(Slot::Idle { .. })) {
            return None;
        }

        match self.slots.insert(path.to_path_buf(), Slot::InUse) {
            Some(Slot::Idle { store, .. }) => Some(store),
            _ => None,
        }
    }

    /// Park the returned store in its idle slot.
    pub(super) fn idle_slot(&mut self, path: PathBuf, store: Box<Store>, now: Instant) {
        self.slots.insert(
            path,
            Slot::Idle {
                store,
                idle_since: now,
            },
        );
    }

    /// Least-recently-used idle path, the eviction candidate when the
    /// pool is full.
    pub(super) fn lru_idle(&self) -> Option<PathBuf> {
        self.slots
            .iter()
            .filter_map(|(path, slot)| match slot {
                Slot::Idle { idle_since, .. } => Some((path, *idle_since)),
                Slot::InUse => None,
            })
            .min_by_key(|(_, idle_since)| *idle_since)
            .map(|(path, _)| path.clone())
    }

    /// Remove an idle slot, returning its store for closing. In-use
    /// slots are never evicted.
    pub(super) fn evict(&mut self, path: &Path) -> Option<Box<Store>> {
        if !matches!(self.slots.get(path), Some(Slot::Idle { .. })) {
            return None;
        }

        match self.slots.remove(path) {
            Some(Slot::Idle { store, .. }) => {
                self.evictions += 1;
                Some(store)
            }
            _ => None,
        }
    }

    /// Evict idle slots past the timeout, oldest first, capped to
    /// bound the pause per maintenance tick.
    pub(super) fn close_idle(&mut self, now: Instant, cap: usize) -> Vec<Box<Store>> {
        let mut candidates: Vec<(PathBuf, Instant)> = self
            .slots
            .iter()
            .filter_map(|(path, slot)| match slot {
                Slot::Idle { idle_since, .. }
                    if now.saturating_duration_since(*idle_since) > self.config.idle_timeout =>
                {
                    Some((path.clone(), *idle_since))
                }
                _ => None,
            })
            .collect();
        candidates.sort_by_key(|(_, idle_since)| *idle_since);
        candidates.truncate(cap);

        candidates
            .into_iter()
            .filter_map(|(path, _)| self.evict(&path))
            .collect()
    }

    /// Drain every idle slot. Used on shutdown.
    pub(super) fn dump_idle(&mut self) -> Vec<Box<Store>> {
        let paths: Vec<PathBuf> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Idle { .. }))
            .map(|(path, _)| path.clone())
            .collect();

        paths
            .into_iter()
            .filter_map(|path| self.evict(&path))
            .collect()
    }

    /// First parked waiter for this exact path.
    pub(super) fn same_path_waiter(&mut self, path: &Path) -> Option<Waiter> {
        let at = self.waiting.iter().position(|waiter| waiter.path == path)?;
        self.waiting.remove(at)
    }

    /// Wake one parked waiter to retry admission. Waiters that gave
    /// up are skipped.
    pub(super) fn wake_one(&mut self) {
        while let Some(waiter) = self.waiting.pop_front() {
            if waiter.tx.send(Ok(None)).is_ok() {
                return;
            }
        }
    }

    /// Fail every parked waiter.
    pub(super) fn close_waiters(&mut self, err: Error) {
        for waiter in self.waiting.drain(..) {
            let _ = waiter.tx.send(Err(err));
        }
    }

    /// Close idle stores under a deleted tenant subtree and remember
    /// how many in-use handles still have to drain.
    pub(super) fn expire_prefix(&mut self, prefix: &Path) -> Vec<Box<Store>> {
        let paths: Vec<PathBuf> = self
            .slots
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect();

        let mut closed = Vec::new();
        let mut in_use = 0;

        for path in paths {
            match self.slots.get(&path) {
                Some(Slot::Idle { .. }) => {
                    if let Some(store) = self.evict(&path) {
                        closed.push(store);
                    }
                }
                Some(Slot::InUse) => in_use += 1,
                None => {}
            }
        }

        if in_use > 0 {
            self.expired.insert(prefix.to_path_buf(), in_use);
        }

        closed
    }

    /// A checkin under an expired prefix must drop its store. Clears
    /// the prefix once the last outstanding handle returns.
    pub(super) fn note_expired(&mut self, path: &Path) -> bool {
        let prefix = self
            .expired
            .keys()
            .find(|prefix| path.starts_with(prefix))
            .cloned();

        let prefix = match prefix {
            Some(prefix) => prefix,
            None => return false,
        };

        if let Some(remaining) = self.expired.get_mut(&prefix) {
            *remaining -= 1;
            if *remaining == 0 {
                self.expired.remove(&prefix);
            }
        }

        true
    }
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("idle", &self.idle())
            .field("in_use", &self.in_use())
            .field("pending", &self.pending.len())
            .field("waiting", &self.waiting.len())
            .field("online", &self.online)
            .finish()
    }
}
