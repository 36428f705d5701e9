//! Runtime choice between the in-memory and LMDB tier stores.

use async_trait::async_trait;
use haven_core::{HavenResult, RequestIdentity, Response};
use haven_storage::{
    CacheStats, CacheTier, InMemoryTier, InMemoryTierStore, LmdbTier, LmdbTierStore, TierStore,
};

/// Store selected at startup from `HAVEN_CACHE_DIR`.
pub enum ProxyStore {
    Memory(InMemoryTierStore),
    Lmdb(LmdbTierStore),
}

pub enum ProxyTier {
    Memory(InMemoryTier),
    Lmdb(LmdbTier),
}

impl ProxyStore {
    pub fn backend(&self) -> &'static str {
        match self {
            ProxyStore::Memory(_) => "memory",
            ProxyStore::Lmdb(_) => "lmdb",
        }
    }
}

#[async_trait]
impl CacheTier for ProxyTier {
    fn name(&self) -> &str {
        match self {
            ProxyTier::Memory(tier) => tier.name(),
            ProxyTier::Lmdb(tier) => tier.name(),
        }
    }

    async fn match_request(&self, identity: &RequestIdentity) -> HavenResult<Option<Response>> {
        match self {
            ProxyTier::Memory(tier) => tier.match_request(identity).await,
            ProxyTier::Lmdb(tier) => tier.match_request(identity).await,
        }
    }

    async fn put(&self, identity: &RequestIdentity, response: &Response) -> HavenResult<()> {
        match self {
            ProxyTier::Memory(tier) => tier.put(identity, response).await,
            ProxyTier::Lmdb(tier) => tier.put(identity, response).await,
        }
    }

    async fn delete(&self, identity: &RequestIdentity) -> HavenResult<bool> {
        match self {
            ProxyTier::Memory(tier) => tier.delete(identity).await,
            ProxyTier::Lmdb(tier) => tier.delete(identity).await,
        }
    }

    async fn keys(&self) -> HavenResult<Vec<RequestIdentity>> {
        match self {
            ProxyTier::Memory(tier) => tier.keys().await,
            ProxyTier::Lmdb(tier) => tier.keys().await,
        }
    }
}

#[async_trait]
impl TierStore for ProxyStore {
    type Tier = ProxyTier;

    async fn open(&self, name: &str) -> HavenResult<ProxyTier> {
        Ok(match self {
            ProxyStore::Memory(store) => ProxyTier::Memory(store.open(name).await?),
            ProxyStore::Lmdb(store) => ProxyTier::Lmdb(store.open(name).await?),
        })
    }

    async fn has_tier(&self, name: &str) -> HavenResult<bool> {
        match self {
            ProxyStore::Memory(store) => store.has_tier(name).await,
            ProxyStore::Lmdb(store) => store.has_tier(name).await,
        }
    }

    async fn list_tier_names(&self) -> HavenResult<Vec<String>> {
        match self {
            ProxyStore::Memory(store) => store.list_tier_names().await,
            ProxyStore::Lmdb(store) => store.list_tier_names().await,
        }
    }

    async fn delete_tier(&self, name: &str) -> HavenResult<bool> {
        match self {
            ProxyStore::Memory(store) => store.delete_tier(name).await,
            ProxyStore::Lmdb(store) => store.delete_tier(name).await,
        }
    }

    async fn match_any(&self, identity: &RequestIdentity) -> HavenResult<Option<Response>> {
        match self {
            ProxyStore::Memory(store) => store.match_any(identity).await,
            ProxyStore::Lmdb(store) => store.match_any(identity).await,
        }
    }

    async fn stats(&self) -> HavenResult<CacheStats> {
        match self {
            ProxyStore::Memory(store) => store.stats().await,
            ProxyStore::Lmdb(store) => store.stats().await,
        }
    }
}
