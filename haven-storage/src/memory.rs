//! In-memory tier store.
//!
//! Not durable across restarts; used by tests and by hosts running without a
//! cache directory. Tier names list in lexicographic order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use haven_core::{CachedEntry, HavenResult, RequestIdentity, Response, StorageError};
use tokio::sync::RwLock;

use crate::traits::{CacheStats, CacheTier, StatsRecorder, TierStore};

type EntryMap = HashMap<RequestIdentity, CachedEntry>;

/// Tier store backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTierStore {
    tiers: Arc<RwLock<TierMap>>,
    recorder: Arc<StatsRecorder>,
}

impl InMemoryTierStore {
    pub fn new() -> Self {
        Self::default()
    }
}

type TierMap = BTreeMap<String, Arc<RwLock<EntryMap>>>;

/// Handle to one in-memory tier.
///
/// Resolves its tier by name on every call, so a handle outliving
/// `delete_tier` reads nothing and its writes fail until the name is opened
/// again.
#[derive(Debug, Clone)]
pub struct InMemoryTier {
    name: String,
    tiers: Arc<RwLock<TierMap>>,
    recorder: Arc<StatsRecorder>,
}

impl InMemoryTier {
    async fn entries(&self) -> Option<Arc<RwLock<EntryMap>>> {
        self.tiers.read().await.get(&self.name).cloned()
    }
}

#[async_trait]
impl CacheTier for InMemoryTier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, identity: &RequestIdentity) -> HavenResult<Option<Response>> {
        let Some(entries) = self.entries().await else {
            return Ok(None);
        };
        let entries = entries.read().await;
        Ok(entries.get(identity).map(|entry| entry.response.clone()))
    }

    async fn put(&self, identity: &RequestIdentity, response: &Response) -> HavenResult<()> {
        // Held across the insert so a concurrent delete_tier cannot slip in.
        let tiers = self.tiers.read().await;
        let Some(entries) = tiers.get(&self.name) else {
            tracing::debug!(tier = %self.name, identity = %identity, "Dropping write to deleted tier");
            return Err(StorageError::WriteFailed {
                tier: self.name.clone(),
                reason: "tier was deleted".to_string(),
            }
            .into());
        };
        let entry = CachedEntry::new(identity.clone(), response.clone());
        entries.write().await.insert(identity.clone(), entry);
        self.recorder.record_write();
        Ok(())
    }

    async fn delete(&self, identity: &RequestIdentity) -> HavenResult<bool> {
        match self.entries().await {
            Some(entries) => Ok(entries.write().await.remove(identity).is_some()),
            None => Ok(false),
        }
    }

    async fn keys(&self) -> HavenResult<Vec<RequestIdentity>> {
        let Some(entries) = self.entries().await else {
            return Ok(Vec::new());
        };
        let mut keys: Vec<_> = entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl TierStore for InMemoryTierStore {
    type Tier = InMemoryTier;

    async fn open(&self, name: &str) -> HavenResult<InMemoryTier> {
        self.tiers
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(InMemoryTier {
            name: name.to_string(),
            tiers: self.tiers.clone(),
            recorder: self.recorder.clone(),
        })
    }

    async fn has_tier(&self, name: &str) -> HavenResult<bool> {
        Ok(self.tiers.read().await.contains_key(name))
    }

    async fn list_tier_names(&self) -> HavenResult<Vec<String>> {
        Ok(self.tiers.read().await.keys().cloned().collect())
    }

    async fn delete_tier(&self, name: &str) -> HavenResult<bool> {
        Ok(self.tiers.write().await.remove(name).is_some())
    }

    async fn match_any(&self, identity: &RequestIdentity) -> HavenResult<Option<Response>> {
        let tiers: Vec<_> = self.tiers.read().await.values().cloned().collect();
        for entries in tiers {
            if let Some(entry) = entries.read().await.get(identity) {
                self.recorder.record_lookup(true);
                return Ok(Some(entry.response.clone()));
            }
        }
        self.recorder.record_lookup(false);
        Ok(None)
    }

    async fn stats(&self) -> HavenResult<CacheStats> {
        let tiers = self.tiers.read().await;
        let mut entry_count = 0u64;
        for entries in tiers.values() {
            entry_count += entries.read().await.len() as u64;
        }
        Ok(self.recorder.snapshot(entry_count, tiers.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::Url;

    fn identity(path: &str) -> RequestIdentity {
        RequestIdentity::get(&Url::parse("https://app.test").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn test_open_creates_tier() {
        let store = InMemoryTierStore::new();
        assert!(!store.has_tier("static-v1").await.unwrap());
        let tier = store.open("static-v1").await.unwrap();
        assert_eq!(tier.name(), "static-v1");
        assert!(store.has_tier("static-v1").await.unwrap());
        assert_eq!(store.list_tier_names().await.unwrap(), vec!["static-v1"]);
    }

    #[tokio::test]
    async fn test_put_overwrites_same_identity() {
        let store = InMemoryTierStore::new();
        let tier = store.open("dynamic-v1").await.unwrap();
        let id = identity("/pages/a.html");

        tier.put(&id, &Response::new(200, "first")).await.unwrap();
        tier.put(&id, &Response::new(200, "second")).await.unwrap();

        let cached = tier.match_request(&id).await.unwrap().unwrap();
        assert_eq!(cached.body_text(), "second");
        assert_eq!(tier.keys().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_match_any_searches_all_tiers() {
        let store = InMemoryTierStore::new();
        let static_tier = store.open("static-v1").await.unwrap();
        let dynamic_tier = store.open("dynamic-v1").await.unwrap();
        static_tier
            .put(&identity("/"), &Response::new(200, "home"))
            .await
            .unwrap();
        dynamic_tier
            .put(&identity("/pages/x"), &Response::new(200, "x"))
            .await
            .unwrap();

        assert!(store.match_any(&identity("/")).await.unwrap().is_some());
        assert!(store.match_any(&identity("/pages/x")).await.unwrap().is_some());
        assert!(store.match_any(&identity("/nope")).await.unwrap().is_none());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.tier_count, 2);
    }

    #[tokio::test]
    async fn test_delete_tier_removes_entries_from_lookup() {
        let store = InMemoryTierStore::new();
        let tier = store.open("static-v0").await.unwrap();
        tier.put(&identity("/"), &Response::new(200, "old"))
            .await
            .unwrap();

        assert!(store.delete_tier("static-v0").await.unwrap());
        assert!(!store.delete_tier("static-v0").await.unwrap());
        assert!(store.match_any(&identity("/")).await.unwrap().is_none());
        assert!(store.list_tier_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_after_delete_is_empty() {
        let store = InMemoryTierStore::new();
        let tier = store.open("dynamic-v1").await.unwrap();
        tier.put(&identity("/pages/a"), &Response::new(200, "a"))
            .await
            .unwrap();
        store.delete_tier("dynamic-v1").await.unwrap();

        let reopened = store.open("dynamic-v1").await.unwrap();
        assert!(reopened.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_through_handle_of_deleted_tier_fails() {
        let store = InMemoryTierStore::new();
        let stale = store.open("dynamic-v1").await.unwrap();
        store.delete_tier("dynamic-v1").await.unwrap();

        let err = stale
            .put(&identity("/pages/a"), &Response::new(200, "stale"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            haven_core::HavenError::Storage(StorageError::WriteFailed { .. })
        ));
        assert!(stale.keys().await.unwrap().is_empty());

        let reopened = store.open("dynamic-v1").await.unwrap();
        assert!(reopened.keys().await.unwrap().is_empty());
        assert!(store.match_any(&identity("/pages/a")).await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().writes, 0);

        // Once the name is open again the old handle writes into the new tier.
        stale
            .put(&identity("/pages/b"), &Response::new(200, "b"))
            .await
            .unwrap();
        assert_eq!(reopened.keys().await.unwrap(), vec![identity("/pages/b")]);
    }
}
