//! Durable iterator offsets.
//!
//! The iter store is a small key-value mapping from an iterator id
//! (`group/topic/shard`) to its committed offset, persisted so a consumer
//! group picks up where it left off across restarts. Values are 8-byte
//! big-endian signed integers.
//!
//! [`RedbIterStore`] is the production backend: a single embedded B-tree
//! database file (`broker.db`) next to the log data. [`MemoryIterStore`] is
//! the in-memory double used by tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

const ITERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("iters");

/// Durable key-value store for committed iterator offsets.
#[async_trait]
pub trait IterStore: Send + Sync {
    /// Persist `offset` under `iter_id`, overwriting any previous value.
    async fn commit(&self, iter_id: &str, offset: i64) -> Result<()>;

    /// Every committed entry whose id starts with `group/topic/`.
    async fn get_all(&self, group: &str, topic: &str) -> Result<HashMap<String, i64>>;
}

/// Iter store backed by an embedded B-tree database.
pub struct RedbIterStore {
    db: Arc<Database>,
}

impl RedbIterStore {
    /// Open or create the backing database file.
    pub fn open(path: impl AsRef<Path>) -> Result<RedbIterStore> {
        let db = Database::create(path.as_ref()).map_err(redb::Error::from)?;
        Ok(RedbIterStore { db: Arc::new(db) })
    }
}

#[async_trait]
impl IterStore for RedbIterStore {
    async fn commit(&self, iter_id: &str, offset: i64) -> Result<()> {
        let db = self.db.clone();
        let iter_id = iter_id.to_string();

        // redb transactions block on fsync; keep them off the runtime.
        tokio::task::spawn_blocking(move || -> Result<()> {
            let txn = db.begin_write().map_err(redb::Error::from)?;
            {
                let mut table = txn.open_table(ITERS_TABLE).map_err(redb::Error::from)?;
                table
                    .insert(iter_id.as_str(), offset.to_be_bytes().as_slice())
                    .map_err(redb::Error::from)?;
            }
            txn.commit().map_err(redb::Error::from)?;
            debug!(iter_id = %iter_id, offset, "iterator committed");
            Ok(())
        })
        .await
        .map_err(|join| Error::Io(std::io::Error::other(join)))?
    }

    async fn get_all(&self, group: &str, topic: &str) -> Result<HashMap<String, i64>> {
        let db = self.db.clone();
        let prefix = format!("{group}/{topic}/");

        tokio::task::spawn_blocking(move || -> Result<HashMap<String, i64>> {
            let txn = db.begin_read().map_err(redb::Error::from)?;
            let table = match txn.open_table(ITERS_TABLE) {
                Ok(table) => table,
                // No commit has ever happened; the table does not exist yet.
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok(HashMap::new()),
                Err(err) => return Err(redb::Error::from(err).into()),
            };

            let mut iters = HashMap::new();
            for entry in table.range(prefix.as_str()..).map_err(redb::Error::from)? {
                let (key, value) = entry.map_err(redb::Error::from)?;
                let key = key.value();
                if !key.starts_with(&prefix) {
                    break;
                }
                iters.insert(key.to_string(), decode_offset(key, value.value())?);
            }
            Ok(iters)
        })
        .await
        .map_err(|join| Error::Io(std::io::Error::other(join)))?
    }
}

fn decode_offset(key: &str, raw: &[u8]) -> Result<i64> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| {
        Error::IllegalArgument(format!(
            "iterator {key} has a {}-byte offset, expected 8",
            raw.len()
        ))
    })?;
    Ok(i64::from_be_bytes(bytes))
}

/// In-memory iter store for tests.
#[derive(Default)]
pub struct MemoryIterStore {
    entries: Mutex<BTreeMap<String, i64>>,
}

impl MemoryIterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IterStore for MemoryIterStore {
    async fn commit(&self, iter_id: &str, offset: i64) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(iter_id.to_string(), offset);
        Ok(())
    }

    async fn get_all(&self, group: &str, topic: &str) -> Result<HashMap<String, i64>> {
        let prefix = format!("{group}/{topic}/");
        let entries = self.entries.lock().await;
        Ok(entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, offset)| (key.clone(), *offset))
            .collect())
    }
}
