//! Log Store
//!
//! The log store manages the set of topics under a root directory:
//!
//! ```text
//! <root>/
//!   <topic>/
//!     0/
//!       shard.idx
//!       00000000001.seg
//!     1/
//!       ...
//!   broker.db        # iterator store, owned by the broker crate
//! ```
//!
//! On open, every subdirectory of the root is loaded as a topic (plain
//! files like `broker.db` are ignored). Closing flushes every shard and
//! then fires a watch channel so the process can wait for a clean
//! shutdown. Every operation after close fails with [`Error::Closed`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use kuling_core::Message;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::shard::create_dir_with_mode;
use crate::topic::Topic;

/// The set of topics under one root directory.
pub struct LogStore {
    root: PathBuf,
    config: StoreConfig,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl LogStore {
    /// Open a log store rooted at `root`, creating the directory if needed
    /// and loading every existing topic.
    pub async fn open(root: impl AsRef<Path>, config: StoreConfig) -> Result<LogStore> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();

        if !root.is_dir() {
            create_dir_with_mode(&root, config.perm_directories)?;
        }

        let mut topics = HashMap::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(?raw, "skipping topic directory with non-utf8 name");
                    continue;
                }
            };
            let topic = Topic::open(entry.path(), &name, &config).await?;
            topics.insert(name, Arc::new(topic));
        }

        info!(
            root = %root.display(),
            topics = topics.len(),
            "log store opened"
        );

        let (closed_tx, _) = watch::channel(false);
        Ok(LogStore {
            root,
            config,
            topics: RwLock::new(topics),
            closed: AtomicBool::new(false),
            closed_tx,
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn validate_topic_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::IllegalArgument("empty topic name".to_string()));
        }
        if name.contains('/') || name.contains('\0') || name.starts_with('.') {
            return Err(Error::IllegalArgument(format!(
                "topic name not filesystem-safe: {name:?}"
            )));
        }
        Ok(())
    }

    /// Create a topic with a fixed number of shards.
    pub async fn create_topic(&self, name: &str, num_shards: u32) -> Result<()> {
        self.ensure_open()?;
        Self::validate_topic_name(name)?;

        let mut topics = self.topics.write().await;
        if topics.contains_key(name) {
            return Err(Error::TopicExists(name.to_string()));
        }

        let topic = Topic::create(self.root.join(name), name, num_shards, &self.config).await?;
        topics.insert(name.to_string(), Arc::new(topic));
        Ok(())
    }

    /// Delete a topic and all its data.
    pub async fn delete_topic(&self, name: &str) -> Result<()> {
        self.ensure_open()?;

        let mut topics = self.topics.write().await;
        let topic = topics
            .remove(name)
            .ok_or_else(|| Error::UnknownTopic(name.to_string()))?;
        std::fs::remove_dir_all(topic.dir())?;
        info!(topic = name, "topic deleted");
        Ok(())
    }

    /// Topic names in sorted order.
    pub async fn topics(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let topics = self.topics.read().await;
        let mut names: Vec<String> = topics.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Shard names of a topic, in numeric order.
    pub async fn shards(&self, topic: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.topic(topic).await?.shard_names())
    }

    /// Shard count of a topic.
    pub async fn num_shards(&self, topic: &str) -> Result<u32> {
        self.ensure_open()?;
        Ok(self.topic(topic).await?.num_shards())
    }

    async fn topic(&self, name: &str) -> Result<Arc<Topic>> {
        let topics = self.topics.read().await;
        topics
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTopic(name.to_string()))
    }

    /// Append a keyed message to a topic shard; returns the sequence id.
    pub async fn append(
        &self,
        topic: &str,
        shard: &str,
        key: Bytes,
        payload: Bytes,
    ) -> Result<i64> {
        self.ensure_open()?;
        self.topic(topic).await?.append(shard, key, payload).await
    }

    /// Read up to `max` messages from a topic shard starting at `start_seq`.
    pub async fn read(
        &self,
        topic: &str,
        shard: &str,
        start_seq: i64,
        max: i64,
    ) -> Result<Vec<Message>> {
        self.ensure_open()?;
        self.topic(topic).await?.read(shard, start_seq, max).await
    }

    /// Stream raw message bytes from a topic shard into `sink`, bracketed
    /// by caller-supplied framing. See [`crate::Shard::copy`].
    pub async fn copy<W, Pre, Post>(
        &self,
        topic: &str,
        shard: &str,
        start_seq: i64,
        max: i64,
        sink: &mut W,
        pre: Pre,
        post: Post,
    ) -> Result<i64>
    where
        W: AsyncWrite + Unpin + ?Sized,
        Pre: FnOnce(i64) -> Bytes,
        Post: FnOnce(i64) -> Bytes,
    {
        self.ensure_open()?;
        self.topic(topic)
            .await?
            .copy(shard, start_seq, max, sink, pre, post)
            .await
    }

    /// Close the store: flush every topic, reject further operations, and
    /// notify [`LogStore::closed`] watchers.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let topics = self.topics.read().await;
        for (name, topic) in topics.iter() {
            if let Err(err) = topic.close().await {
                warn!(topic = name, error = %err, "error closing topic");
            }
        }
        drop(topics);

        let _ = self.closed_tx.send(true);
        info!(root = %self.root.display(), "log store closed");
        Ok(())
    }

    /// A watch channel that flips to `true` once the store has closed.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("root", &self.root)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
