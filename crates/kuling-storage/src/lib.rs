//! Kuling on-disk log engine.
//!
//! The storage hierarchy, leaves first:
//!
//! - [`Segment`]: one append-only file of messages
//! - [`ShardIndex`]: dense sequence-id → (segment, offset) mapping
//! - [`Shard`]: ordered segments + index + write lock + rollover
//! - [`Topic`]: a fixed set of shards under one directory
//! - [`LogStore`]: the set of topics under a root directory
//!
//! Writes are serialized per shard and durable before they are
//! acknowledged (see [`SyncPolicy`]); reads never block writes.

pub mod config;
pub mod error;
pub mod index;
pub mod segment;
pub mod shard;
pub mod store;
pub mod topic;

pub use config::{StoreConfig, SyncPolicy, DEFAULT_SEGMENT_MAX_BYTES};
pub use error::{Error, Result};
pub use index::ShardIndex;
pub use segment::Segment;
pub use shard::Shard;
pub use store::LogStore;
pub use topic::Topic;
