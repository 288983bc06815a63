//! Sharded analytics storage.
//!
//! Tenants are directories of monthly shards; each shard is a small
//! SQLite file. The pool bounds how many are open at once, the cache
//! remembers per-shard answers, and the driver stitches the two
//! together per request.

pub mod analytic;
pub mod cache;
pub mod dbpath;
pub mod error;
pub mod pool;
pub mod results;
pub mod sharded;
pub mod shards;
pub mod store;
pub mod timerange;

pub use analytic::Analytic;
pub use dbpath::DBPath;
pub use error::Error;
pub use results::{Aggregate, Aggregates, Analytics, Count, Interval, Intervals};
pub use sharded::{Params, Sharded};
pub use store::{Property, Store};
pub use timerange::TimeRange;
