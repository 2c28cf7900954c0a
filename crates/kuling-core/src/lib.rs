//! Core types shared by every Kuling crate.
//!
//! This crate defines the two wire-level building blocks of the system:
//!
//! - [`Message`]: the on-disk/on-wire record format. Every message carries a
//!   per-shard sequence id, a CRC32 of its payload, and length-prefixed key
//!   and payload bytes.
//! - [`Iter`]: a consumer-group iterator, canonically encoded as the string
//!   `group/topic/shard/offset`.
//!
//! Everything here is synchronous and allocation-light; the async machinery
//! lives in the storage and server crates.

pub mod error;
pub mod iter;
pub mod message;

pub use error::{Error, Result};
pub use iter::Iter;
pub use message::Message;
