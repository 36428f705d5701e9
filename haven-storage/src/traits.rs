//! Cache tier store traits.
//!
//! The store is owned by the host and outlives any agent instance. Agents
//! open a tier by name, perform one logical operation and drop the handle;
//! nothing holds a tier across unrelated suspension points.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use haven_core::{HavenResult, RequestIdentity, Response};

/// A single named tier: request identity → response snapshot.
///
/// Individual reads and writes are atomic; there is no transaction spanning
/// a read followed by a write.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Name the tier was opened under.
    fn name(&self) -> &str;

    /// Look up a stored response.
    async fn match_request(&self, identity: &RequestIdentity) -> HavenResult<Option<Response>>;

    /// Store a response, overwriting any entry with the same identity.
    ///
    /// Fails with `StorageError::WriteFailed` when the tier has been deleted
    /// since this handle was opened; a put never brings a tier back.
    async fn put(&self, identity: &RequestIdentity, response: &Response) -> HavenResult<()>;

    /// Remove one entry. Returns whether it existed.
    async fn delete(&self, identity: &RequestIdentity) -> HavenResult<bool>;

    /// Identities currently stored in this tier.
    async fn keys(&self) -> HavenResult<Vec<RequestIdentity>>;
}

/// The durable collection of named tiers.
///
/// Implementations must tolerate concurrent callers; two writers racing on
/// the same identity simply overwrite each other.
#[async_trait]
pub trait TierStore: Send + Sync {
    type Tier: CacheTier + 'static;

    /// Open a tier, creating it if it does not exist.
    async fn open(&self, name: &str) -> HavenResult<Self::Tier>;

    /// Whether a tier exists, without creating it.
    async fn has_tier(&self, name: &str) -> HavenResult<bool>;

    /// Names of all tiers in the store.
    async fn list_tier_names(&self) -> HavenResult<Vec<String>>;

    /// Delete a tier and all of its entries. Returns whether it existed.
    async fn delete_tier(&self, name: &str) -> HavenResult<bool>;

    /// Search every tier for an identity. Tiers are peers; the first hit wins.
    async fn match_any(&self, identity: &RequestIdentity) -> HavenResult<Option<Response>>;

    /// Usage statistics.
    async fn stats(&self) -> HavenResult<CacheStats>;
}

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of `match_any` hits.
    pub hits: u64,
    /// Number of `match_any` misses.
    pub misses: u64,
    /// Number of successful puts.
    pub writes: u64,
    /// Number of entries across all tiers.
    pub entry_count: u64,
    /// Number of tiers.
    pub tier_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters shared between a store and the tiers it hands out.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entry_count: u64, tier_count: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entry_count,
            tier_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_recorder_snapshot() {
        let recorder = StatsRecorder::default();
        recorder.record_lookup(true);
        recorder.record_lookup(false);
        recorder.record_lookup(false);
        recorder.record_write();

        let stats = recorder.snapshot(4, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.entry_count, 4);
        assert_eq!(stats.tier_count, 2);
    }
}
