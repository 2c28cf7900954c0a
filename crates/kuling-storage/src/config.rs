//! Store Configuration
//!
//! Controls how the log store lays files on disk:
//!
//! - **perm_directories**: octal mode for created directories (≥ 0700)
//! - **perm_data**: octal mode for created data files (≥ 0600)
//! - **segment_max_bytes**: soft cap on a segment file; an append that would
//!   push the active segment past it rolls a new segment first
//! - **sync**: fsync policy. `Always` (the default) makes every successful
//!   append durable before it returns; `Batched` defers fsync to segment
//!   rollover and close, trading the PUT durability guarantee for
//!   bulk-loading throughput.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default segment soft cap: 10 MiB.
pub const DEFAULT_SEGMENT_MAX_BYTES: i64 = 10 * 1024 * 1024;

/// Fsync policy for the append path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// `sync_data` after every segment append and index write.
    #[default]
    Always,

    /// Defer fsync to rollover and close. A crash can lose appends that
    /// were already acknowledged.
    Batched,
}

impl SyncPolicy {
    pub(crate) fn per_append(self) -> bool {
        matches!(self, SyncPolicy::Always)
    }
}

/// Configuration passed to [`crate::LogStore::open`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// File mode for created directories.
    #[serde(default = "default_perm_directories")]
    pub perm_directories: u32,

    /// File mode for created data files.
    #[serde(default = "default_perm_data")]
    pub perm_data: u32,

    /// Soft cap for a single segment file in bytes.
    #[serde(default = "default_segment_max_bytes")]
    pub segment_max_bytes: i64,

    /// Fsync policy.
    #[serde(default)]
    pub sync: SyncPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            perm_directories: default_perm_directories(),
            perm_data: default_perm_data(),
            segment_max_bytes: default_segment_max_bytes(),
            sync: SyncPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Reject configurations the running user could not operate under.
    pub fn validate(&self) -> Result<()> {
        if self.perm_directories & 0o700 != 0o700 {
            return Err(Error::InvalidConfig(format!(
                "directories need at least owner rwx (0700), got {:04o}",
                self.perm_directories
            )));
        }
        if self.perm_data & 0o600 != 0o600 {
            return Err(Error::InvalidConfig(format!(
                "data files need at least owner rw (0600), got {:04o}",
                self.perm_data
            )));
        }
        if self.segment_max_bytes <= 0 {
            return Err(Error::InvalidConfig(format!(
                "segment_max_bytes must be positive, got {}",
                self.segment_max_bytes
            )));
        }
        Ok(())
    }
}

fn default_perm_directories() -> u32 {
    0o700
}

fn default_perm_data() -> u32 {
    0o600
}

fn default_segment_max_bytes() -> i64 {
    DEFAULT_SEGMENT_MAX_BYTES
}
