//! Topics
//!
//! A topic is a directory holding one subdirectory per shard. The shard
//! count is fixed at creation: shard names are the decimal strings `"0"`
//! through `"N-1"` and the set never grows or shrinks.
//!
//! Creation is transactional: either every shard directory comes up with
//! its index and initial segment, or the topic directory is removed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tracing::{info, warn};

use kuling_core::Message;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::shard::{create_dir_with_mode, Shard};

/// A named container of a fixed set of shards.
pub struct Topic {
    name: String,
    dir: PathBuf,
    shards: HashMap<String, Arc<Shard>>,
}

impl Topic {
    /// Create a topic directory with `num_shards` shards. On any failure
    /// the topic directory is removed again.
    pub async fn create(
        dir: impl AsRef<Path>,
        name: &str,
        num_shards: u32,
        config: &StoreConfig,
    ) -> Result<Topic> {
        if num_shards == 0 {
            return Err(Error::IllegalArgument(
                "topic needs at least one shard".to_string(),
            ));
        }
        let dir = dir.as_ref().to_path_buf();
        create_dir_with_mode(&dir, config.perm_directories)?;

        let mut shards = HashMap::with_capacity(num_shards as usize);
        for i in 0..num_shards {
            let shard_name = i.to_string();
            match Shard::open(dir.join(&shard_name), config).await {
                Ok(shard) => {
                    shards.insert(shard_name, Arc::new(shard));
                }
                Err(err) => {
                    warn!(
                        topic = name,
                        shard = %shard_name,
                        error = %err,
                        "shard creation failed, rolling back topic"
                    );
                    if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                        warn!(dir = %dir.display(), error = %cleanup, "rollback failed");
                    }
                    return Err(err);
                }
            }
        }

        info!(topic = name, num_shards, "topic created");
        Ok(Topic {
            name: name.to_string(),
            dir,
            shards,
        })
    }

    /// Load an existing topic directory, opening every shard subdirectory.
    pub async fn open(dir: impl AsRef<Path>, name: &str, config: &StoreConfig) -> Result<Topic> {
        let dir = dir.as_ref().to_path_buf();

        let mut shards = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let shard_name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            let shard = Shard::open(entry.path(), config).await?;
            shards.insert(shard_name, Arc::new(shard));
        }

        Ok(Topic {
            name: name.to_string(),
            dir,
            shards,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of shards, fixed at creation.
    pub fn num_shards(&self) -> u32 {
        self.shards.len() as u32
    }

    /// Shard names in numeric order.
    pub fn shard_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shards.keys().cloned().collect();
        names.sort_by_key(|name| name.parse::<u64>().unwrap_or(u64::MAX));
        names
    }

    fn shard(&self, shard: &str) -> Result<&Arc<Shard>> {
        self.shards.get(shard).ok_or_else(|| Error::UnknownShard {
            topic: self.name.clone(),
            shard: shard.to_string(),
        })
    }

    /// Append to a shard by exact name match.
    pub async fn append(&self, shard: &str, key: Bytes, payload: Bytes) -> Result<i64> {
        self.shard(shard)?.append(key, payload).await
    }

    /// Read messages from a shard.
    pub async fn read(&self, shard: &str, start_seq: i64, max: i64) -> Result<Vec<Message>> {
        self.shard(shard)?.read(start_seq, max).await
    }

    /// Stream raw message bytes from a shard with caller framing.
    pub async fn copy<W, Pre, Post>(
        &self,
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
        self.shard(shard)?.copy(start_seq, max, sink, pre, post).await
    }

    /// Total bytes across all shards.
    pub async fn size(&self) -> i64 {
        let mut total = 0;
        for shard in self.shards.values() {
            total += shard.size().await;
        }
        total
    }

    /// Flush and fsync every shard.
    pub async fn close(&self) -> Result<()> {
        for shard in self.shards.values() {
            shard.close().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("shards", &self.shards.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StoreConfig {
        StoreConfig::default()
    }

    fn bytes(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[tokio::test]
    async fn test_create_makes_all_shard_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let topic_dir = dir.path().join("orders");
        let topic = Topic::create(&topic_dir, "orders", 4, &config())
            .await
            .unwrap();

        assert_eq!(topic.num_shards(), 4);
        assert_eq!(topic.shard_names(), vec!["0", "1", "2", "3"]);
        for name in topic.shard_names() {
            assert!(topic_dir.join(&name).join("shard.idx").is_file());
            assert!(topic_dir.join(&name).join("00000000001.seg").is_file());
        }
    }

    #[tokio::test]
    async fn test_create_rejects_zero_shards() {
        let dir = tempfile::tempdir().unwrap();
        let result = Topic::create(dir.path().join("t"), "t", 0, &config()).await;
        assert!(matches!(result, Err(Error::IllegalArgument(_))));
        assert!(!dir.path().join("t").exists());
    }

    #[tokio::test]
    async fn test_append_routes_by_shard_name() {
        let dir = tempfile::tempdir().unwrap();
        let topic = Topic::create(dir.path().join("t"), "t", 2, &config())
            .await
            .unwrap();

        topic.append("0", bytes("k"), bytes("to-zero")).await.unwrap();
        topic.append("1", bytes("k"), bytes("to-one")).await.unwrap();

        assert_eq!(topic.read("0", 1, 1).await.unwrap()[0].payload, bytes("to-zero"));
        assert_eq!(topic.read("1", 1, 1).await.unwrap()[0].payload, bytes("to-one"));
    }

    #[tokio::test]
    async fn test_unknown_shard() {
        let dir = tempfile::tempdir().unwrap();
        let topic = Topic::create(dir.path().join("t"), "t", 2, &config())
            .await
            .unwrap();

        assert!(matches!(
            topic.append("7", bytes("k"), bytes("v")).await,
            Err(Error::UnknownShard { .. })
        ));
        assert!(matches!(
            topic.read("x", 1, 1).await,
            Err(Error::UnknownShard { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_reloads_existing_shards() {
        let dir = tempfile::tempdir().unwrap();
        let topic_dir = dir.path().join("t");

        {
            let topic = Topic::create(&topic_dir, "t", 3, &config()).await.unwrap();
            topic.append("2", bytes("k"), bytes("persisted")).await.unwrap();
            topic.close().await.unwrap();
        }

        let reopened = Topic::open(&topic_dir, "t", &config()).await.unwrap();
        assert_eq!(reopened.num_shards(), 3);
        assert_eq!(
            reopened.read("2", 1, 1).await.unwrap()[0].payload,
            bytes("persisted")
        );
    }

    #[tokio::test]
    async fn test_shard_names_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        let topic = Topic::create(dir.path().join("t"), "t", 12, &config())
            .await
            .unwrap();
        let names = topic.shard_names();
        assert_eq!(names[0], "0");
        assert_eq!(names[9], "9");
        assert_eq!(names[10], "10");
        assert_eq!(names[11], "11");
    }
}
