//! Disk-backed cache of per-shard partial results.
//!
//! Entries are serde_json-encoded partials keyed by a normalized
//! request fingerprint (see [`key`]). Only partials are ever stored;
//! merged answers are cheap to rebuild from them.

pub mod key;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tempfile::NamedTempFile;
use tracing::warn;

/// Entries live under a major-version directory so a format change
/// orphans old files instead of decoding them.
const MAJOR_VERSION: &str = env!("CARGO_PKG_VERSION_MAJOR");

/// Content-addressed file cache.
pub struct Diskache {
    root: PathBuf,
}

impl std::fmt::Debug for Diskache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diskache").field("root", &self.root).finish()
    }
}

impl Diskache {
    pub fn new(dir: &Path) -> io::Result<Self> {
        let root = dir.join(MAJOR_VERSION);
        fs::create_dir_all(&root)?;

        Ok(Self { root })
    }

    /// Entry bytes, or a miss. Read failures are misses, not errors.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.entry_path(key)).ok()
    }

    /// Write an entry atomically. Best effort: failures are logged
    /// and never fail the request being served.
    pub fn put(&self, key: &str, bytes: &[u8]) {
        if let Err(err) = self.put_internal(key, bytes) {
            warn!("cache write failed: {}", err);
        }
    }

    fn put_internal(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let mut file = NamedTempFile::new_in(&self.root)?;
        file.write_all(bytes)?;
        file.persist(self.entry_path(key)).map_err(|err| err.error)?;

        Ok(())
    }

    pub fn delete(&self, key: &str) {
        let _ = fs::remove_file(self.entry_path(key));
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha1::digest(key.as_bytes());
        self.root.join(hex::encode(digest))
    }
}
