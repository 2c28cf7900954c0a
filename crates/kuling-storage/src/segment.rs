//! Segment Files
//!
//! A segment is one append-only file holding a contiguous run of messages in
//! sequence-id order. Shards own an ordered list of segments; only the
//! highest-numbered one (the active segment) ever receives writes, older
//! segments are immutable.
//!
//! File names encode the segment's 1-based number, zero-padded to 11 digits:
//! `00000000001.seg`.
//!
//! ## Concurrency
//!
//! The owning shard serializes appends. Readers never coordinate with the
//! writer: each `read`/`copy` opens a fresh read-only descriptor and bounds
//! itself by a size snapshot taken from an atomic counter, which only moves
//! forward after the bytes it covers are on disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use fs2::FileExt;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, SeekFrom};
use tokio::sync::Mutex;
use tracing::debug;

use kuling_core::Message;

use crate::error::{Error, Result};

/// How long to keep retrying the advisory file lock before giving up.
const LOCK_RETRY_TIMEOUT: Duration = Duration::from_secs(1);
const LOCK_RETRY_STEP: Duration = Duration::from_millis(25);

/// File extension for segment files.
pub const SEGMENT_SUFFIX: &str = ".seg";

/// Build a segment file name from its 1-based number.
pub fn segment_file_name(number: i64) -> String {
    format!("{number:011}{SEGMENT_SUFFIX}")
}

/// One append-only segment file.
pub struct Segment {
    path: PathBuf,

    /// Append-only write handle. Also holds the advisory lock for the
    /// lifetime of the segment.
    writer: Mutex<File>,

    /// Segment size in bytes. Advanced only after a successful append.
    size: AtomicI64,
}

impl Segment {
    /// Open or create a segment file, acquire its exclusive advisory lock
    /// and record the current size.
    pub async fn open(path: impl AsRef<Path>, perm_data: u32) -> Result<Segment> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            debug!(path = %path.display(), "creating segment file");
        }

        let std_file = open_append_locked(&path, perm_data).await?;
        let size = std_file.metadata()?.len() as i64;

        Ok(Segment {
            path,
            writer: Mutex::new(File::from_std(std_file)),
            size: AtomicI64::new(size),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size in bytes.
    pub fn size(&self) -> i64 {
        self.size.load(Ordering::Acquire)
    }

    /// Append one message and, when `sync` is set, force it to stable
    /// storage before returning. Returns the number of bytes written.
    ///
    /// The size counter is not advanced on failure, so a torn write leaves
    /// the byte offset free for reuse by the next successful append.
    pub async fn append(&self, message: &Message, sync: bool) -> Result<i64> {
        let mut buf = BytesMut::with_capacity(message.len());
        message.encode(&mut buf);
        let encoded = buf.freeze();

        let mut writer = self.writer.lock().await;
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        if sync {
            writer.sync_data().await?;
        }

        let written = encoded.len() as i64;
        self.size.fetch_add(written, Ordering::AcqRel);
        Ok(written)
    }

    /// Read the byte range `[start, end)` and parse it into messages.
    pub async fn read(&self, start: i64, end: i64) -> Result<Vec<Message>> {
        let mut reader = self.reader_for_range(start, end).await?;
        let mut raw = Vec::with_capacity((end - start) as usize);
        reader.read_to_end(&mut raw).await?;
        Ok(Message::decode_all(Bytes::from(raw))?)
    }

    /// Stream the byte range `[start, end)` into `sink`, returning the
    /// number of bytes copied.
    pub async fn copy<W>(&self, start: i64, end: i64, sink: &mut W) -> Result<i64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut reader = self.reader_for_range(start, end).await?;
        let copied = tokio::io::copy(&mut reader, sink).await?;
        Ok(copied as i64)
    }

    /// Flush and fsync the write handle.
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.sync_data().await?;
        Ok(())
    }

    /// Validate a byte range against the current size snapshot and return a
    /// fresh read-only handle positioned at `start`, limited to the range.
    async fn reader_for_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<impl AsyncRead + Unpin> {
        let size = self.size();
        if start < 0 || start > size {
            return Err(Error::StartOffsetIllegal {
                path: self.path.clone(),
                offset: start,
            });
        }
        if end < start || end > size {
            return Err(Error::EndOffsetIllegal {
                path: self.path.clone(),
                offset: end,
            });
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start as u64)).await?;
        Ok(file.take((end - start) as u64))
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("path", &self.path)
            .field("size", &self.size())
            .finish()
    }
}

/// Open a file for appending with the given mode and take its exclusive
/// advisory lock, retrying within [`LOCK_RETRY_TIMEOUT`].
///
/// The lock guards against a second process corrupting the file; it is
/// released when the returned handle is dropped.
pub(crate) async fn open_append_locked(
    path: &Path,
    perm_data: u32,
) -> Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(perm_data)
        .open(path)?;

    let deadline = tokio::time::Instant::now() + LOCK_RETRY_TIMEOUT;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(LOCK_RETRY_STEP).await;
            }
            Err(_) => return Err(Error::LockFailed(path.to_path_buf())),
        }
    }
}
