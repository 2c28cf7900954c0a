//! Shard Index
//!
//! `shard.idx` is a dense append-only array of fixed 24-byte entries, one
//! per message in the shard:
//!
//! ```text
//! ┌─────────────┬─────────────┬────────────────┐
//! │ Sequence ID │ Byte Offset │ Segment Number │
//! │ (8, BE)     │ (8, BE)     │ (8, BE)        │
//! └─────────────┴─────────────┴────────────────┘
//! ```
//!
//! The Nth entry (0-based) describes sequence id N+1, so a lookup never
//! scans: it seeks straight to `24·(S−1) + 8` and reads the offset and
//! segment number. The sequence id stored at position 0 of each entry is
//! redundant under this scheme; it is kept for on-disk diagnostics.
//!
//! The segment number is the 0-based position of the segment in the shard's
//! ordered segment list (segment file names are that position + 1).
//!
//! ## Concurrency
//!
//! The shard serializes `next` calls under its write lock. `lookup` is safe
//! against a concurrent `next` because entries are append-only and each
//! lookup opens a fresh read-only descriptor bounded by the sequence-id
//! counter it sampled.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::{Buf, BufMut, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Error, Result};
use crate::segment::open_append_locked;

/// Size of one index entry in bytes.
pub const ENTRY_LEN: i64 = 24;

/// File name of the index within a shard directory.
pub const INDEX_FILE_NAME: &str = "shard.idx";

/// The per-shard sequence-id → (segment, offset) index.
pub struct ShardIndex {
    path: PathBuf,

    /// Append-only write handle, also holding the advisory lock.
    writer: Mutex<File>,

    /// The sequence id the next `next()` call will assign.
    next_sequence_id: AtomicI64,
}

impl ShardIndex {
    /// Open or create the index file, lock it, and recover the next
    /// sequence id from the file size.
    ///
    /// A trailing partial entry (a torn write from a crash) is truncated
    /// away before the sequence counter is derived.
    pub async fn open(path: impl AsRef<Path>, perm_data: u32) -> Result<ShardIndex> {
        let path = path.as_ref().to_path_buf();
        let std_file = open_append_locked(&path, perm_data).await?;

        let mut size = std_file.metadata()?.len() as i64;
        if size % ENTRY_LEN != 0 {
            let aligned = size - size % ENTRY_LEN;
            warn!(
                path = %path.display(),
                size,
                aligned,
                "index has a torn trailing entry, truncating"
            );
            std_file.set_len(aligned as u64)?;
            size = aligned;
        }

        let next_sequence_id = size / ENTRY_LEN + 1;

        Ok(ShardIndex {
            path,
            writer: Mutex::new(File::from_std(std_file)),
            next_sequence_id: AtomicI64::new(next_sequence_id),
        })
    }

    /// Number of entries in the index.
    pub fn len(&self) -> i64 {
        self.next_sequence_id() - 1
    }

    /// True when no message has ever been indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sequence id the next append will receive.
    pub fn next_sequence_id(&self) -> i64 {
        self.next_sequence_id.load(Ordering::Acquire)
    }

    /// Append one entry mapping the next sequence id to `(segment_number,
    /// offset)` and return that sequence id.
    ///
    /// The caller (the shard) must serialize calls; the entry is flushed
    /// (and fsynced when `sync` is set) before the id is handed out.
    pub async fn next(&self, segment_number: i64, offset: i64, sync: bool) -> Result<i64> {
        if offset < 0 {
            return Err(Error::NegativeOffset(offset));
        }
        if segment_number < 0 {
            return Err(Error::IllegalArgument(format!(
                "negative segment number: {segment_number}"
            )));
        }

        let sequence_id = self.next_sequence_id();

        let mut entry = BytesMut::with_capacity(ENTRY_LEN as usize);
        entry.put_i64(sequence_id);
        entry.put_i64(offset);
        entry.put_i64(segment_number);

        let mut writer = self.writer.lock().await;
        writer.write_all(&entry).await?;
        writer.flush().await?;
        if sync {
            writer.sync_data().await?;
        }
        drop(writer);

        self.next_sequence_id.fetch_add(1, Ordering::AcqRel);
        Ok(sequence_id)
    }

    /// Look up the `(segment_number, offset)` recorded for a sequence id.
    pub async fn lookup(&self, sequence_id: i64) -> Result<(i64, i64)> {
        if sequence_id <= 0 || sequence_id > self.next_sequence_id() - 1 {
            return Err(Error::SequenceIdNotFound(sequence_id));
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(
            (ENTRY_LEN * (sequence_id - 1) + 8) as u64,
        ))
        .await?;

        let mut raw = [0u8; 16];
        if let Err(err) = file.read_exact(&mut raw).await {
            // A reader racing a not-yet-flushed writer can land past EOF.
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                return Err(Error::SequenceIdNotFound(sequence_id));
            }
            return Err(err.into());
        }

        let mut buf = &raw[..];
        let offset = buf.get_i64();
        let segment_number = buf.get_i64();
        if offset < 0 {
            return Err(Error::NegativeOffset(offset));
        }

        Ok((segment_number, offset))
    }

    /// Shrink the index to `entries` entries, dropping the tail.
    ///
    /// Used at shard open to reconcile entries that point past the end of
    /// their segment (an append that indexed but never hit the segment).
    pub async fn truncate_to(&self, entries: i64) -> Result<()> {
        let current = self.len();
        if entries < 0 || entries > current {
            return Err(Error::IllegalArgument(format!(
                "cannot truncate index of {current} entries to {entries}"
            )));
        }

        let writer = self.writer.lock().await;
        writer.set_len((entries * ENTRY_LEN) as u64).await?;
        writer.sync_data().await?;
        drop(writer);

        self.next_sequence_id
            .store(entries + 1, Ordering::Release);
        Ok(())
    }

    /// Flush and fsync the write handle.
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.sync_data().await?;
        Ok(())
    }
}

impl std::fmt::Debug for ShardIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardIndex")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}
