//! Consumer-group coordination.
//!
//! The broker tracks, per group, a consistent-hash ring of client ids and
//! the iterators currently issued to them. Joining a group (via `iters`)
//! adds the client to the ring; the shards of the requested topic that hash
//! to the client are returned as iterator strings carrying the persisted
//! offset (or 0). Committing persists an offset under the iterator id.
//!
//! In-memory state is process-local and rebuilt from the iter store on
//! restart. Ring membership only grows: there is no expiry of dead clients
//! within a process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use kuling_core::iter::{iter_id, normalize_iter_id};
use kuling_core::Iter;
use kuling_storage::LogStore;

use crate::error::{Error, Result};
use crate::iterstore::IterStore;
use crate::ring::Ring;

/// In-memory state of one consumer group.
#[derive(Debug, Default)]
struct Group {
    ring: Ring,
    /// Iterator id → the iterator string most recently issued for it.
    inflight: HashMap<String, String>,
}

/// The consumer-group coordinator.
pub struct Broker {
    logs: Arc<LogStore>,
    iters: Arc<dyn IterStore>,
    groups: DashMap<String, Arc<RwLock<Group>>>,
}

impl Broker {
    pub fn new(logs: Arc<LogStore>, iters: Arc<dyn IterStore>) -> Broker {
        Broker {
            logs,
            iters,
            groups: DashMap::new(),
        }
    }

    fn group(&self, name: &str) -> Arc<RwLock<Group>> {
        self.groups
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Group::default())))
            .clone()
    }

    /// Join `client` to `group` (if not already a member) and return the
    /// iterators for every shard of `topic` the ring assigns to it.
    pub async fn iters(&self, group: &str, client: &str, topic: &str) -> Result<Vec<String>> {
        if group.is_empty() || client.is_empty() {
            return Err(Error::IllegalArgument(
                "group and client must be non-empty".to_string(),
            ));
        }
        if group.contains('/') || client.contains('/') {
            return Err(Error::IllegalArgument(
                "group and client must not contain '/'".to_string(),
            ));
        }

        let shards = self.logs.shards(topic).await?;
        let persisted = self.iters.get_all(group, topic).await?;

        let group_state = self.group(group);
        let mut state = group_state.write().await;

        if state.ring.insert(client) {
            info!(group, client, members = state.ring.len(), "client joined group");
        }

        let mut issued = Vec::new();
        for shard in &shards {
            let owner = state.ring.assign(&format!("{topic}/{shard}"));
            if owner != Some(client) {
                continue;
            }

            let id = iter_id(group, topic, shard);
            let offset = persisted.get(&id).copied().unwrap_or(0);
            let iter = Iter::new(group, topic, shard.as_str(), offset).to_string();
            state.inflight.insert(id, iter.clone());
            issued.push(iter);
        }

        debug!(
            group,
            client,
            topic,
            issued = issued.len(),
            of = shards.len(),
            "iterators issued"
        );
        Ok(issued)
    }

    /// Persist `offset` for an issued iterator. Accepts the iterator id or
    /// the full iterator string; returns the id on success.
    pub async fn commit(&self, iter_ref: &str, offset: i64) -> Result<String> {
        if offset < 0 {
            return Err(Error::IllegalArgument(format!(
                "negative offset: {offset}"
            )));
        }

        let id = normalize_iter_id(iter_ref)?;
        let group_name = id.split('/').next().unwrap_or_default();

        let group_state = self
            .groups
            .get(group_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnknownIterator(id.clone()))?;

        {
            let state = group_state.read().await;
            if !state.inflight.contains_key(&id) {
                return Err(Error::UnknownIterator(id.clone()));
            }
        }

        self.iters.commit(&id, offset).await?;
        Ok(id)
    }
}
