//! HAVEN Storage - Cache Tier Store
//!
//! Named, versioned response caches. Two backends share one trait surface:
//! an in-memory store for tests and ephemeral hosts, and an LMDB store for
//! durable caches.

pub mod lmdb;
pub mod memory;
pub mod traits;

pub use lmdb::{LmdbStoreError, LmdbTier, LmdbTierStore};
pub use memory::{InMemoryTier, InMemoryTierStore};
pub use traits::{CacheStats, CacheTier, TierStore};
