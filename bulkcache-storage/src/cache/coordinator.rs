//! Batch cache coordinator.
//!
//! Selects one bulk semantic per call and runs it against the configured
//! store, forwarding to the underlying source at most once.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bulkcache_core::{
    BulkCacheResult, BulkOperationKind, CacheKey, CacheSource, ConfigError, CoordinatorConfig,
    KeyStrategy, MethodSignature, OperationDeclaration, OperationDeclarationBuilder, UnlessScope,
};
use tracing::{debug, trace};

use super::context::OperationContext;
use super::evaluator::{ConditionEvaluator, ResultView};
use super::invocation::{Invocation, InvocationOutput};
use super::traits::{CacheElement, CacheHandle, CacheValue, KeyGenerator, KeyedCacheStore};

/// Snapshot of coordinator counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Keys served from a cache.
    pub hits: u64,
    /// Keys forwarded to the source.
    pub misses: u64,
    /// Calls to the underlying source.
    pub invocations: u64,
    /// Batches whose condition was false.
    pub bypassed: u64,
    /// Entries written (counted once per cache).
    pub puts: u64,
    /// Entries evicted (counted once per cache).
    pub evictions: u64,
}

impl BatchStats {
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

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    invocations: AtomicU64,
    bypassed: AtomicU64,
    puts: AtomicU64,
    evictions: AtomicU64,
}

/// Runs declared bulk operations around an intercepted invocation.
///
/// # Example
///
/// ```ignore
/// let coordinator = BatchCacheCoordinator::new(store, Arc::new(evaluator))
///     .with_key_generator("itemKey", Arc::new(ItemKeyGenerator));
///
/// let read = coordinator.declare(OperationDeclaration::read().cache("items"), &method)?;
/// let items = coordinator.execute(&[read], invocation).await?.into_mapping()?;
/// ```
pub struct BatchCacheCoordinator<K, V> {
    store: Arc<dyn KeyedCacheStore<V>>,
    cache_sources: HashMap<String, Arc<dyn KeyedCacheStore<V>>>,
    evaluator: Arc<dyn ConditionEvaluator<K, V>>,
    key_generators: HashMap<String, Arc<dyn KeyGenerator<K, V>>>,
    config: CoordinatorConfig,
    counters: Counters,
}

impl<K: CacheElement, V: CacheValue> BatchCacheCoordinator<K, V> {
    /// Create a coordinator over a default store.
    pub fn new(
        store: Arc<dyn KeyedCacheStore<V>>,
        evaluator: Arc<dyn ConditionEvaluator<K, V>>,
    ) -> Self {
        Self {
            store,
            cache_sources: HashMap::new(),
            evaluator,
            key_generators: HashMap::new(),
            config: CoordinatorConfig::default(),
            counters: Counters::default(),
        }
    }

    /// Replace the coordinator config (class defaults, statistics toggle).
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a store for declarations naming a cache manager or resolver.
    pub fn with_cache_source(
        mut self,
        name: impl Into<String>,
        store: Arc<dyn KeyedCacheStore<V>>,
    ) -> Self {
        self.cache_sources.insert(name.into(), store);
        self
    }

    /// Register a key generator under a name.
    pub fn with_key_generator(
        mut self,
        name: impl Into<String>,
        generator: Arc<dyn KeyGenerator<K, V>>,
    ) -> Self {
        self.key_generators.insert(name.into(), generator);
        self
    }

    /// The active coordinator config.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Current counters. All zero when statistics are disabled.
    pub fn stats(&self) -> BatchStats {
        BatchStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            invocations: self.counters.invocations.load(Ordering::Relaxed),
            bypassed: self.counters.bypassed.load(Ordering::Relaxed),
            puts: self.counters.puts.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Build a declaration with the configured defaults applied.
    pub fn declare(
        &self,
        builder: OperationDeclarationBuilder,
        method: &MethodSignature,
    ) -> BulkCacheResult<OperationDeclaration> {
        let declaration = builder.with_defaults(&self.config.defaults).build(method)?;
        Ok(declaration)
    }

    /// Run the applicable bulk operation around `invocation`.
    ///
    /// The first read declaration wins, then the first write, then the first
    /// evict. With none of them the invocation proceeds untouched.
    pub async fn execute(
        &self,
        declarations: &[OperationDeclaration],
        invocation: Invocation<'_, K, V>,
    ) -> BulkCacheResult<InvocationOutput<K, V>> {
        let Some(declaration) = Self::select(declarations) else {
            trace!(method = %invocation.method(), "no bulk operation declared");
            self.bump(&self.counters.invocations, 1);
            return invocation.proceed().await;
        };

        match declaration.kind() {
            BulkOperationKind::BulkRead { find_all: true } => {
                self.find_all(declaration, invocation).await
            }
            BulkOperationKind::BulkRead { find_all: false } => {
                self.bulk_read(declaration, invocation).await
            }
            BulkOperationKind::BulkWrite => self.bulk_write(declaration, invocation).await,
            BulkOperationKind::BulkEvict => self.bulk_evict(declaration, invocation).await,
        }
    }

    fn select(declarations: &[OperationDeclaration]) -> Option<&OperationDeclaration> {
        let first = |matches: fn(&BulkOperationKind) -> bool| {
            declarations.iter().find(|decl| matches(&decl.kind()))
        };
        first(BulkOperationKind::is_read)
            .or_else(|| first(BulkOperationKind::is_write))
            .or_else(|| first(BulkOperationKind::is_evict))
    }

    async fn bulk_read(
        &self,
        declaration: &OperationDeclaration,
        invocation: Invocation<'_, K, V>,
    ) -> BulkCacheResult<InvocationOutput<K, V>> {
        let mut candidates = invocation.bulk_argument()?;
        let store = self.store_for(declaration)?;
        let mut ctx = self.context(declaration, invocation.method(), invocation.target())?;

        if !ctx.is_eligible_by_condition(candidates.keys())? {
            debug!(
                operation = %declaration.name(),
                keys = candidates.len(),
                "condition not met, bypassing cache"
            );
            self.bump(&self.counters.bypassed, 1);
            self.bump(&self.counters.invocations, 1);
            let mapping = invocation.proceed().await?.into_mapping()?;
            return Ok(InvocationOutput::Mapping(mapping));
        }

        ctx.resolve_caches(store).await?;

        let mut result = HashMap::with_capacity(candidates.len());
        let mut resolved = Vec::with_capacity(candidates.len());
        for id in candidates.keys() {
            let key = ctx.generate_key(id)?;
            match self.find_in_caches(store, ctx.caches(), &key).await? {
                Some(value) => {
                    result.insert(id.clone(), value);
                    resolved.push(true);
                }
                None => {
                    trace!(operation = %declaration.name(), key = %key, "cache miss");
                    resolved.push(false);
                }
            }
        }

        let requested = candidates.len();
        candidates.remove_resolved(&resolved);
        let misses = candidates.len();
        let hits = requested - misses;
        self.bump(&self.counters.hits, hits);
        self.bump(&self.counters.misses, misses);
        debug!(
            operation = %declaration.name(),
            hits,
            misses,
            "resolved batch against cache"
        );

        if candidates.is_empty() {
            return Ok(InvocationOutput::Mapping(result));
        }

        self.bump(&self.counters.invocations, 1);
        let fetched = invocation.proceed_with(candidates).await?.into_mapping()?;
        self.put_mapping(&ctx, store, &fetched).await?;
        result.extend(fetched);

        Ok(InvocationOutput::Mapping(result))
    }

    async fn find_all(
        &self,
        declaration: &OperationDeclaration,
        invocation: Invocation<'_, K, V>,
    ) -> BulkCacheResult<InvocationOutput<K, V>> {
        let store = self.store_for(declaration)?;
        let mut ctx = self.context(declaration, invocation.method(), invocation.target())?;
        ctx.resolve_caches(store).await?;

        self.bump(&self.counters.invocations, 1);
        let mapping = invocation.proceed().await?.into_mapping()?;
        debug!(
            operation = %declaration.name(),
            entries = mapping.len(),
            "materialized find-all result"
        );
        self.put_mapping(&ctx, store, &mapping).await?;

        Ok(InvocationOutput::Mapping(mapping))
    }

    async fn bulk_write(
        &self,
        declaration: &OperationDeclaration,
        invocation: Invocation<'_, K, V>,
    ) -> BulkCacheResult<InvocationOutput<K, V>> {
        let store = self.store_for(declaration)?;
        let mut ctx = self.context(declaration, invocation.method(), invocation.target())?;
        ctx.resolve_caches(store).await?;

        self.bump(&self.counters.invocations, 1);
        let values = invocation.proceed().await?.into_collection()?;
        for value in &values {
            let key = ctx.generate_value_key(value)?;
            self.put_all(store, ctx.caches(), &key, value).await?;
        }
        debug!(
            operation = %declaration.name(),
            written = values.len(),
            "wrote through batch"
        );

        Ok(InvocationOutput::Collection(values))
    }

    async fn bulk_evict(
        &self,
        declaration: &OperationDeclaration,
        invocation: Invocation<'_, K, V>,
    ) -> BulkCacheResult<InvocationOutput<K, V>> {
        let candidates = invocation.bulk_argument()?;
        let store = self.store_for(declaration)?;
        let mut ctx = self.context(declaration, invocation.method(), invocation.target())?;

        if ctx.is_eligible_by_condition(candidates.keys())? {
            ctx.resolve_caches(store).await?;
            for id in candidates.keys() {
                let key = ctx.generate_key(id)?;
                for cache in ctx.caches() {
                    store.evict(cache, &key).await?;
                    self.bump(&self.counters.evictions, 1);
                    trace!(cache = %cache, key = %key, "evicted");
                }
            }
            debug!(
                operation = %declaration.name(),
                keys = candidates.len(),
                "evicted batch"
            );
        } else {
            debug!(
                operation = %declaration.name(),
                keys = candidates.len(),
                "condition not met, skipping eviction"
            );
            self.bump(&self.counters.bypassed, 1);
        }

        self.bump(&self.counters.invocations, 1);
        invocation.proceed().await
    }

    /// Write a source mapping entry by entry, honoring `unless`.
    async fn put_mapping(
        &self,
        ctx: &OperationContext<'_, K, V>,
        store: &dyn KeyedCacheStore<V>,
        mapping: &HashMap<K, V>,
    ) -> BulkCacheResult<()> {
        let operation = ctx.declaration().name();
        match ctx.declaration().unless_scope() {
            UnlessScope::WholeResult => {
                if !ctx.is_eligible_to_cache(ResultView::Mapping(mapping))? {
                    debug!(operation = %operation, entries = mapping.len(), "unless vetoed result");
                    return Ok(());
                }
                for (id, value) in mapping {
                    let key = ctx.generate_key(id)?;
                    self.put_all(store, ctx.caches(), &key, value).await?;
                }
            }
            UnlessScope::PerEntry => {
                for (id, value) in mapping {
                    if !ctx.is_eligible_to_cache(ResultView::Entry(id, value))? {
                        trace!(operation = %operation, "unless vetoed entry");
                        continue;
                    }
                    let key = ctx.generate_key(id)?;
                    self.put_all(store, ctx.caches(), &key, value).await?;
                }
            }
        }
        Ok(())
    }

    async fn put_all(
        &self,
        store: &dyn KeyedCacheStore<V>,
        caches: &[CacheHandle],
        key: &CacheKey,
        value: &V,
    ) -> BulkCacheResult<()> {
        for cache in caches {
            store.put(cache, key, value.clone()).await?;
            self.bump(&self.counters.puts, 1);
            trace!(cache = %cache, key = %key, "cached entry");
        }
        Ok(())
    }

    /// Probe caches in order; the first hit wins.
    async fn find_in_caches(
        &self,
        store: &dyn KeyedCacheStore<V>,
        caches: &[CacheHandle],
        key: &CacheKey,
    ) -> BulkCacheResult<Option<V>> {
        for cache in caches {
            if let Some(value) = store.get(cache, key).await? {
                trace!(cache = %cache, key = %key, "cache hit");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn store_for(&self, declaration: &OperationDeclaration) -> BulkCacheResult<&dyn KeyedCacheStore<V>> {
        match declaration.cache_source() {
            CacheSource::Default => Ok(self.store.as_ref()),
            CacheSource::Manager(name) | CacheSource::Resolver(name) => self
                .cache_sources
                .get(name)
                .map(|store| store.as_ref())
                .ok_or_else(|| ConfigError::UnknownCacheSource { name: name.clone() }.into()),
        }
    }

    fn context<'c>(
        &'c self,
        declaration: &'c OperationDeclaration,
        method: &'c MethodSignature,
        target: &'c (dyn Any + Send + Sync),
    ) -> BulkCacheResult<OperationContext<'c, K, V>> {
        let ctx = OperationContext::new(declaration, method, target, self.evaluator.as_ref());
        match declaration.key() {
            KeyStrategy::Generator(name) => {
                let generator = self.key_generators.get(name).ok_or_else(|| {
                    ConfigError::UnknownKeyGenerator { name: name.clone() }
                })?;
                Ok(ctx.with_key_generator(generator.as_ref()))
            }
            KeyStrategy::Identity | KeyStrategy::Expression(_) => Ok(ctx),
        }
    }

    fn bump(&self, counter: &AtomicU64, n: usize) {
        if self.config.stats_enabled {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }
}
