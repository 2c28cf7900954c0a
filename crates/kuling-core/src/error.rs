//! Error types for core message and iterator codecs.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("message truncated: need {needed} more bytes")]
    Truncated { needed: usize },

    #[error("invalid magic byte: {0:#04x}")]
    InvalidMagic(u8),

    #[error("negative {field} length: {value}")]
    NegativeLength { field: &'static str, value: i32 },

    #[error("crc mismatch for sequence id {sequence_id}: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        sequence_id: i64,
        stored: u32,
        computed: u32,
    },

    #[error("invalid iterator: {0}")]
    InvalidIterator(String),
}
