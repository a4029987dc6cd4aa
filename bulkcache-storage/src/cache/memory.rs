//! In-memory keyed cache store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bulkcache_core::{BulkCacheResult, CacheKey, StoreError};
use tokio::sync::RwLock;

use super::traits::{CacheHandle, CacheStats, CacheValue, KeyedCacheStore};

/// Named caches held in process memory.
///
/// Either dynamic (a cache is created the first time its name is resolved) or
/// fixed to the names given to [`InMemoryCacheStore::with_caches`], in which
/// case resolving any other name fails with [`StoreError::CacheNotFound`].
pub struct InMemoryCacheStore<V> {
    caches: RwLock<HashMap<String, HashMap<CacheKey, V>>>,
    dynamic: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    evictions: AtomicU64,
}

impl<V> Default for InMemoryCacheStore<V> {
    fn default() -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            dynamic: true,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }
}

impl<V: CacheValue> InMemoryCacheStore<V> {
    /// Create a store that creates caches on first resolve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding exactly the named caches.
    pub fn with_caches<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let caches = names
            .into_iter()
            .map(|name| (name.into(), HashMap::new()))
            .collect();
        Self {
            caches: RwLock::new(caches),
            dynamic: false,
            ..Self::default()
        }
    }

    /// Usage counters plus the current number of entries.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: self.entry_count().await as u64,
        }
    }

    /// Number of entries across all caches.
    pub async fn entry_count(&self) -> usize {
        self.caches.read().await.values().map(HashMap::len).sum()
    }

    pub async fn contains(&self, cache: &str, key: &CacheKey) -> bool {
        self.caches
            .read()
            .await
            .get(cache)
            .is_some_and(|entries| entries.contains_key(key))
    }

    /// Read an entry without touching the counters.
    pub async fn peek(&self, cache: &str, key: &CacheKey) -> Option<V> {
        self.caches
            .read()
            .await
            .get(cache)
            .and_then(|entries| entries.get(key).cloned())
    }

    /// Drop every entry of one cache; returns how many were removed.
    pub async fn clear(&self, cache: &str) -> usize {
        let mut caches = self.caches.write().await;
        caches
            .get_mut(cache)
            .map(|entries| {
                let removed = entries.len();
                entries.clear();
                removed
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl<V: CacheValue> KeyedCacheStore<V> for InMemoryCacheStore<V> {
    async fn resolve(&self, names: &[String]) -> BulkCacheResult<Vec<CacheHandle>> {
        let mut caches = self.caches.write().await;
        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            if !caches.contains_key(name) {
                if !self.dynamic {
                    return Err(StoreError::CacheNotFound { name: name.clone() }.into());
                }
                caches.insert(name.clone(), HashMap::new());
            }
            handles.push(CacheHandle::new(name.as_str()));
        }
        Ok(handles)
    }

    async fn get(&self, cache: &CacheHandle, key: &CacheKey) -> BulkCacheResult<Option<V>> {
        let caches = self.caches.read().await;
        let entries = caches.get(cache.name()).ok_or_else(|| StoreError::CacheNotFound {
            name: cache.name().to_string(),
        })?;

        let value = entries.get(key).cloned();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn put(&self, cache: &CacheHandle, key: &CacheKey, value: V) -> BulkCacheResult<()> {
        let mut caches = self.caches.write().await;
        let entries = caches
            .get_mut(cache.name())
            .ok_or_else(|| StoreError::CacheNotFound {
                name: cache.name().to_string(),
            })?;
        entries.insert(key.clone(), value);
        self.puts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn evict(&self, cache: &CacheHandle, key: &CacheKey) -> BulkCacheResult<()> {
        let mut caches = self.caches.write().await;
        let entries = caches
            .get_mut(cache.name())
            .ok_or_else(|| StoreError::CacheNotFound {
                name: cache.name().to_string(),
            })?;
        if entries.remove(key).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
