//! Store guard.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use crate::database::store::Store;

use super::Pool;

/// Exclusive handle to one shard store, checked back into the pool on
/// drop. Double release is impossible by construction.
pub struct Guard {
    pool: Pool,
    path: PathBuf,
    store: Option<Box<Store>>,
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard").field("path", &self.path).finish()
    }
}

impl Guard {
    pub(super) fn new(pool: Pool, path: PathBuf, store: Box<Store>) -> Self {
        Self {
            pool,
            path,
            store: Some(store),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Deref for Guard {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref().unwrap()
    }
}

impl DerefMut for Guard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.store.as_mut().unwrap()
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            self.pool.checkin(&self.path, store);
        }
    }
}
