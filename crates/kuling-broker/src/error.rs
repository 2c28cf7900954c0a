//! Broker error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown iterator: {0}")]
    UnknownIterator(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("invalid iterator: {0}")]
    InvalidIterator(#[from] kuling_core::Error),

    #[error("log store: {0}")]
    Store(#[from] kuling_storage::Error),

    #[error("iter store backend: {0}")]
    Backend(#[from] redb::Error),

    #[error("iter store io: {0}")]
    Io(#[from] std::io::Error),
}
