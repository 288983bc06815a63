//! Pool errors.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("checkout timeout")]
    CheckoutTimeout,

    #[error("pool is offline")]
    Offline,

    #[error("shard store error")]
    Storage,
}
