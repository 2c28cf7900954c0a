//! Storage Error Types
//!
//! One variant per failure kind a caller can act on:
//!
//! - `Closed`: any operation after the store shut down
//! - `UnknownTopic` / `UnknownShard`: name lookup miss
//! - `IllegalArgument`: empty key/payload, negative sequence id or max
//! - `SequenceIdNotFound`: sequence id outside the shard's assigned range
//! - `StartOffsetIllegal` / `EndOffsetIllegal` / `NegativeOffset`: byte-range
//!   validation on segments and the index
//! - `Io` / `LockFailed`: underlying filesystem failures
//!
//! All storage operations return `Result<T>` aliased to `Result<T, Error>`.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("log store is closed")]
    Closed,

    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("unknown shard: {topic}/{shard}")]
    UnknownShard { topic: String, shard: String },

    #[error("topic already exists: {0}")]
    TopicExists(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("sequence id not found: {0}")]
    SequenceIdNotFound(i64),

    #[error("segment {path}: start offset illegal: {offset}")]
    StartOffsetIllegal { path: PathBuf, offset: i64 },

    #[error("segment {path}: end offset illegal: {offset}")]
    EndOffsetIllegal { path: PathBuf, offset: i64 },

    #[error("negative offset: {0}")]
    NegativeOffset(i64),

    #[error("could not acquire exclusive lock on {0}")]
    LockFailed(PathBuf),

    #[error("invalid store config: {0}")]
    InvalidConfig(String),

    #[error("corrupt message data: {0}")]
    Message(#[from] kuling_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
