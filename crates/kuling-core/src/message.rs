//! Message Record Format
//!
//! A message is the fundamental unit of data in Kuling: one keyed binary
//! record in a shard, similar to a Kafka message.
//!
//! ## On-disk layout (big-endian, fixed field order)
//!
//! ```text
//! ┌───────┬─────────────┬───────┬─────────┬───────┬─────────────┬─────────┐
//! │ Magic │ Sequence ID │ CRC32 │ Key Len │ Key   │ Payload Len │ Payload │
//! │ (1)   │ (8)         │ (4)   │ (4)     │ (N)   │ (4)         │ (M)     │
//! └───────┴─────────────┴───────┴─────────┴───────┴─────────────┴─────────┘
//! ```
//!
//! The CRC is the IEEE CRC32 of the payload only. Sequence ids are dense,
//! per-shard, and start at 1; they are assigned by the shard index at append
//! time, never by the producer.
//!
//! Uses `bytes::Bytes` for the key and payload so decoded messages can share
//! the fetch buffer without copying.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Current (and only) magic byte.
pub const MAGIC: u8 = 0;

/// Fixed per-message overhead: magic + sequence id + crc + two length fields.
pub const HEADER_LEN: usize = 1 + 8 + 4 + 4 + 4;

/// A single keyed record in a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Dense per-shard sequence id, starting at 1.
    pub sequence_id: i64,

    /// IEEE CRC32 of the payload.
    pub crc: u32,

    /// Message key.
    pub key: Bytes,

    /// Message payload.
    pub payload: Bytes,
}

impl Message {
    /// Build a message, computing the payload CRC.
    pub fn new(sequence_id: i64, key: Bytes, payload: Bytes) -> Self {
        let crc = crc32fast::hash(&payload);
        Self {
            sequence_id,
            crc,
            key,
            payload,
        }
    }

    /// The exact number of bytes `encode` will produce for a message with
    /// the given key and payload lengths.
    pub fn encoded_len(key_len: usize, payload_len: usize) -> usize {
        HEADER_LEN + key_len + payload_len
    }

    /// Bytes this message occupies on disk.
    pub fn len(&self) -> usize {
        Self::encoded_len(self.key.len(), self.payload.len())
    }

    /// True when both key and payload are empty. Stored messages never are;
    /// the shard rejects empty keys and payloads before encoding.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.payload.is_empty()
    }

    /// Recompute the payload CRC and compare against the stored one.
    pub fn crc_valid(&self) -> bool {
        crc32fast::hash(&self.payload) == self.crc
    }

    /// Append the wire encoding of this message to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.len());
        buf.put_u8(MAGIC);
        buf.put_i64(self.sequence_id);
        buf.put_u32(self.crc);
        buf.put_i32(self.key.len() as i32);
        buf.put_slice(&self.key);
        buf.put_i32(self.payload.len() as i32);
        buf.put_slice(&self.payload);
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode one message from the front of `src`, advancing it.
    ///
    /// Fails with [`Error::Truncated`] when `src` holds less than one full
    /// message, and with [`Error::CrcMismatch`] when the stored checksum
    /// does not match the payload bytes. A decoded message is either whole
    /// and verified or an error, never garbage.
    pub fn decode(src: &mut Bytes) -> Result<Message> {
        if src.len() < HEADER_LEN {
            return Err(Error::Truncated {
                needed: HEADER_LEN - src.len(),
            });
        }

        // Peek the fixed header before consuming anything so a truncated
        // buffer is left untouched for a retry with more data.
        let mut peek = &src[..];
        let magic = peek.get_u8();
        if magic != MAGIC {
            return Err(Error::InvalidMagic(magic));
        }
        let sequence_id = peek.get_i64();
        let crc = peek.get_u32();
        let key_len = peek.get_i32();
        if key_len < 0 {
            return Err(Error::NegativeLength {
                field: "key",
                value: key_len,
            });
        }
        if peek.remaining() < key_len as usize + 4 {
            return Err(Error::Truncated {
                needed: key_len as usize + 4 - peek.remaining(),
            });
        }
        peek.advance(key_len as usize);
        let payload_len = peek.get_i32();
        if payload_len < 0 {
            return Err(Error::NegativeLength {
                field: "payload",
                value: payload_len,
            });
        }
        if peek.remaining() < payload_len as usize {
            return Err(Error::Truncated {
                needed: payload_len as usize - peek.remaining(),
            });
        }

        // Whole message present: carve zero-copy slices out of src.
        src.advance(1 + 8 + 4 + 4);
        let key = src.split_to(key_len as usize);
        src.advance(4);
        let payload = src.split_to(payload_len as usize);

        let computed = crc32fast::hash(&payload);
        if computed != crc {
            return Err(Error::CrcMismatch {
                sequence_id,
                stored: crc,
                computed,
            });
        }

        Ok(Message {
            sequence_id,
            crc,
            key,
            payload,
        })
    }

    /// Decode every message in `src`. The buffer must contain a whole number
    /// of messages; a trailing partial record is an error.
    pub fn decode_all(mut src: Bytes) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        while !src.is_empty() {
            messages.push(Message::decode(&mut src)?);
        }
        Ok(messages)
    }
}
