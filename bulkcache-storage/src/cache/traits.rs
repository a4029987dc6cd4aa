//! Cache store traits and element bounds.
//!
//! This module defines the traits that cache stores and key generators must
//! implement, and the bounds on keys and values that flow through a batch.

use async_trait::async_trait;
use bulkcache_core::{BulkCacheResult, CacheKey, MethodSignature};
use serde::Serialize;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use super::evaluator::Element;

/// Bound for the elements of a bulk argument (the "ids" of a batch).
///
/// Elements are used as mapping keys in results, so they must hash; they are
/// serialized to derive their natural-identity cache key.
pub trait CacheElement: Clone + Eq + Hash + Serialize + Send + Sync + 'static {}

impl<T> CacheElement for T where T: Clone + Eq + Hash + Serialize + Send + Sync + 'static {}

/// Bound for cached values.
pub trait CacheValue: Clone + Serialize + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + Send + Sync + 'static {}

/// A resolved, named cache instance inside a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheHandle {
    name: Arc<str>,
}

impl CacheHandle {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for CacheHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Keyed cache store over one or more named caches.
///
/// Implementations must be safe for concurrent use from many outstanding
/// invocations. Failures are returned, never swallowed: the coordinator
/// propagates a failed `get` instead of treating it as a miss.
#[async_trait]
pub trait KeyedCacheStore<V: CacheValue>: Send + Sync {
    /// Resolve declared cache names to handles, preserving order.
    async fn resolve(&self, names: &[String]) -> BulkCacheResult<Vec<CacheHandle>>;

    /// Look up one entry.
    async fn get(&self, cache: &CacheHandle, key: &CacheKey) -> BulkCacheResult<Option<V>>;

    /// Store one entry, replacing any previous value.
    async fn put(&self, cache: &CacheHandle, key: &CacheKey, value: V) -> BulkCacheResult<()>;

    /// Remove one entry. Removing an absent key is not an error.
    async fn evict(&self, cache: &CacheHandle, key: &CacheKey) -> BulkCacheResult<()>;
}

/// Custom key derivation registered under a name.
///
/// Used by declarations whose key strategy names a generator instead of an
/// expression.
pub trait KeyGenerator<K, V>: Send + Sync {
    fn generate(&self, method: &MethodSignature, element: Element<'_, K, V>)
        -> BulkCacheResult<CacheKey>;
}

/// Statistics about cache store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries written.
    pub puts: u64,
    /// Number of entries removed by eviction.
    pub evictions: u64,
    /// Number of entries currently in all caches.
    pub entry_count: u64,
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
    fn test_cache_handle_name() {
        let handle = CacheHandle::new("myCache");
        assert_eq!(handle.name(), "myCache");
        assert_eq!(handle.to_string(), "myCache");
        assert_eq!(handle, CacheHandle::new(String::from("myCache")));
    }
}
