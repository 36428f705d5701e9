//! LMDB-backed tier store.
//!
//! Uses the heed crate (Rust bindings for LMDB) so cached responses survive
//! process restarts and are shared by successive agent instances.
//!
//! # Layout
//!
//! - `tiers`: tier name → creation time (little-endian epoch millis)
//! - `entries`: `<tier name>\0<METHOD> <url>` → JSON [`CachedEntry`]
//!
//! Tier names never contain NUL, so the prefix of an entry key uniquely
//! identifies its tier.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use haven_core::{CachedEntry, HavenResult, RequestIdentity, Response, StorageError};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::traits::{CacheStats, CacheTier, StatsRecorder, TierStore};

/// Error type for opening the LMDB environment.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbStoreError to HavenError.
impl From<LmdbStoreError> for haven_core::HavenError {
    fn from(e: LmdbStoreError) -> Self {
        haven_core::HavenError::Storage(StorageError::Environment {
            reason: e.to_string(),
        })
    }
}

const TIERS_DB: &str = "tiers";
const ENTRIES_DB: &str = "entries";

fn tier_prefix(tier: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(tier.len() + 1);
    prefix.extend_from_slice(tier.as_bytes());
    prefix.push(0);
    prefix
}

fn entry_key(tier: &str, identity: &RequestIdentity) -> Vec<u8> {
    let mut key = tier_prefix(tier);
    key.extend_from_slice(&identity.encode());
    key
}

fn read_err(tier: &str) -> impl Fn(heed::Error) -> StorageError + '_ {
    move |e| StorageError::ReadFailed {
        tier: tier.to_string(),
        reason: e.to_string(),
    }
}

fn write_err(tier: &str) -> impl Fn(heed::Error) -> StorageError + '_ {
    move |e| StorageError::WriteFailed {
        tier: tier.to_string(),
        reason: e.to_string(),
    }
}

fn decode_entry(bytes: &[u8]) -> Result<CachedEntry, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization {
        reason: e.to_string(),
    })
}

/// Durable tier store.
///
/// # Example
///
/// ```ignore
/// let store = LmdbTierStore::new("/var/cache/haven", 256)?;
/// let tier = store.open("static-v1").await?;
/// tier.put(&identity, &response).await?;
/// ```
#[derive(Clone)]
pub struct LmdbTierStore {
    env: Env,
    tiers: Database<Bytes, Bytes>,
    entries: Database<Bytes, Bytes>,
    recorder: Arc<StatsRecorder>,
}

impl LmdbTierStore {
    /// Open (or create) a store in `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(2)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        let tiers: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(TIERS_DB))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        let entries: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(ENTRIES_DB))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), max_size_mb, "LMDB tier store opened");

        Ok(Self {
            env,
            tiers,
            entries,
            recorder: Arc::new(StatsRecorder::default()),
        })
    }

    fn tier_names(&self) -> Result<Vec<String>, StorageError> {
        let list_err = |e: heed::Error| StorageError::ListFailed {
            reason: e.to_string(),
        };
        let rtxn = self.env.read_txn().map_err(list_err)?;
        let mut names = Vec::new();
        for result in self.tiers.iter(&rtxn).map_err(list_err)? {
            let (key, _) = result.map_err(list_err)?;
            names.push(String::from_utf8_lossy(key).into_owned());
        }
        Ok(names)
    }

    fn tier_handle(&self, name: &str) -> LmdbTier {
        LmdbTier {
            name: name.to_string(),
            env: self.env.clone(),
            tiers: self.tiers,
            entries: self.entries,
            recorder: self.recorder.clone(),
        }
    }
}

/// Handle to one durable tier.
///
/// Writes through a handle whose tier has since been deleted fail with
/// [`StorageError::WriteFailed`]; they never recreate the tier.
#[derive(Clone)]
pub struct LmdbTier {
    name: String,
    env: Env,
    tiers: Database<Bytes, Bytes>,
    entries: Database<Bytes, Bytes>,
    recorder: Arc<StatsRecorder>,
}

impl LmdbTier {
    fn lookup(&self, identity: &RequestIdentity) -> Result<Option<Response>, StorageError> {
        let key = entry_key(&self.name, identity);
        let rtxn = self.env.read_txn().map_err(read_err(&self.name))?;
        match self.entries.get(&rtxn, &key).map_err(read_err(&self.name))? {
            Some(bytes) => Ok(Some(decode_entry(bytes)?.response)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CacheTier for LmdbTier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, identity: &RequestIdentity) -> HavenResult<Option<Response>> {
        Ok(self.lookup(identity)?)
    }

    async fn put(&self, identity: &RequestIdentity, response: &Response) -> HavenResult<()> {
        let entry = CachedEntry::new(identity.clone(), response.clone());
        let value = serde_json::to_vec(&entry).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })?;
        let key = entry_key(&self.name, identity);

        let mut wtxn = self.env.write_txn().map_err(write_err(&self.name))?;
        if self
            .tiers
            .get(&wtxn, self.name.as_bytes())
            .map_err(write_err(&self.name))?
            .is_none()
        {
            tracing::debug!(tier = %self.name, identity = %identity, "Dropping write to deleted tier");
            return Err(StorageError::WriteFailed {
                tier: self.name.clone(),
                reason: "tier was deleted".to_string(),
            }
            .into());
        }
        self.entries
            .put(&mut wtxn, &key, &value)
            .map_err(write_err(&self.name))?;
        wtxn.commit().map_err(write_err(&self.name))?;

        self.recorder.record_write();
        Ok(())
    }

    async fn delete(&self, identity: &RequestIdentity) -> HavenResult<bool> {
        let key = entry_key(&self.name, identity);
        let mut wtxn = self.env.write_txn().map_err(write_err(&self.name))?;
        let deleted = self
            .entries
            .delete(&mut wtxn, &key)
            .map_err(write_err(&self.name))?;
        wtxn.commit().map_err(write_err(&self.name))?;
        Ok(deleted)
    }

    async fn keys(&self) -> HavenResult<Vec<RequestIdentity>> {
        let prefix = tier_prefix(&self.name);
        let rtxn = self.env.read_txn().map_err(read_err(&self.name))?;
        let mut keys = Vec::new();
        for result in self.entries.iter(&rtxn).map_err(read_err(&self.name))? {
            let (key, _) = result.map_err(read_err(&self.name))?;
            if let Some(rest) = key.strip_prefix(prefix.as_slice()) {
                if let Some(identity) = RequestIdentity::decode(rest) {
                    keys.push(identity);
                }
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl TierStore for LmdbTierStore {
    type Tier = LmdbTier;

    async fn open(&self, name: &str) -> HavenResult<LmdbTier> {
        let open_err = |e: heed::Error| StorageError::TierOpen {
            tier: name.to_string(),
            reason: e.to_string(),
        };

        let mut wtxn = self.env.write_txn().map_err(open_err)?;
        if self.tiers.get(&wtxn, name.as_bytes()).map_err(open_err)?.is_none() {
            let created_at = Utc::now().timestamp_millis().to_le_bytes();
            self.tiers
                .put(&mut wtxn, name.as_bytes(), &created_at)
                .map_err(open_err)?;
            tracing::debug!(tier = name, "Tier created");
        }
        wtxn.commit().map_err(open_err)?;

        Ok(self.tier_handle(name))
    }

    async fn has_tier(&self, name: &str) -> HavenResult<bool> {
        let rtxn = self.env.read_txn().map_err(read_err(name))?;
        Ok(self
            .tiers
            .get(&rtxn, name.as_bytes())
            .map_err(read_err(name))?
            .is_some())
    }

    async fn list_tier_names(&self) -> HavenResult<Vec<String>> {
        Ok(self.tier_names()?)
    }

    async fn delete_tier(&self, name: &str) -> HavenResult<bool> {
        let delete_err = |e: heed::Error| StorageError::DeleteFailed {
            tier: name.to_string(),
            reason: e.to_string(),
        };

        let prefix = tier_prefix(name);
        let mut wtxn = self.env.write_txn().map_err(delete_err)?;
        let mut keys_to_delete = Vec::new();
        for result in self
            .entries
            .prefix_iter(&wtxn, prefix.as_slice())
            .map_err(delete_err)?
        {
            let (key, _) = result.map_err(delete_err)?;
            keys_to_delete.push(key.to_vec());
        }

        let existed = self
            .tiers
            .delete(&mut wtxn, name.as_bytes())
            .map_err(delete_err)?;
        for key in &keys_to_delete {
            self.entries.delete(&mut wtxn, key).map_err(delete_err)?;
        }
        wtxn.commit().map_err(delete_err)?;

        tracing::debug!(tier = name, existed, entries = keys_to_delete.len(), "Tier deleted");
        Ok(existed)
    }

    async fn match_any(&self, identity: &RequestIdentity) -> HavenResult<Option<Response>> {
        for name in self.tier_names()? {
            if let Some(response) = self.tier_handle(&name).lookup(identity)? {
                self.recorder.record_lookup(true);
                return Ok(Some(response));
            }
        }
        self.recorder.record_lookup(false);
        Ok(None)
    }

    async fn stats(&self) -> HavenResult<CacheStats> {
        let stats_err = |e: heed::Error| StorageError::Environment {
            reason: e.to_string(),
        };
        let rtxn = self.env.read_txn().map_err(stats_err)?;
        let entry_count = self.entries.len(&rtxn).map_err(stats_err)?;
        let tier_count = self.tiers.len(&rtxn).map_err(stats_err)?;
        Ok(self.recorder.snapshot(entry_count, tier_count))
    }
}
