//! Keyed shard store pool.
//!
//! Hands out exclusive handles to per-shard SQLite stores, bounded by
//! a global open-handle cap. At most one live handle exists per shard
//! path, which is what serializes concurrent access to a shard.

pub mod comms;
pub mod config;
pub mod error;
pub mod guard;
pub mod inner;
pub mod monitor;
pub mod pool_impl;
pub mod request;
pub mod waiting;

pub use config::Config;
pub use error::Error;
pub use guard::Guard;
pub use pool_impl::{Pool, State};
pub use request::Request;

use comms::Comms;
use inner::{Inner, Slot};
use monitor::Monitor;
use waiting::{Waiter, Waiting};
