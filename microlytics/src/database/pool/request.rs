//! Store checkout request.

use std::path::PathBuf;

use tokio::time::Instant;

/// A request for the store behind one shard path.
#[derive(Debug, Clone)]
pub struct Request {
    pub path: PathBuf,
    pub created_at: Instant,
}

impl Request {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            created_at: Instant::now(),
        }
    }
}
