//! Kuling consumer-group broker.
//!
//! Coordinates which client of a consumer group reads which shards of a
//! topic, and persists committed read positions:
//!
//! - [`Broker`]: group membership + consistent-hash shard assignment
//! - [`Ring`]: the hash ring behind the assignment
//! - [`IterStore`]: durable offset storage ([`RedbIterStore`] on disk,
//!   [`MemoryIterStore`] for tests)

pub mod broker;
pub mod error;
pub mod iterstore;
pub mod ring;

pub use broker::Broker;
pub use error::{Error, Result};
pub use iterstore::{IterStore, MemoryIterStore, RedbIterStore};
pub use ring::Ring;
