//! Multi-tenant analytics ingestion and query service. Events are
//! stored per tenant in monthly SQLite shards; queries fan out over
//! the shards they touch and merge the partial answers.

pub mod cli;
pub mod database;
pub mod enrich;
pub mod web;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Later calls are no-ops, so
/// tests can call this freely.
pub fn logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
