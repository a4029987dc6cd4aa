//! BULKCACHE Test Utilities
//!
//! Centralized test infrastructure for the BULKCACHE workspace:
//! - Recording and failing cache stores
//! - A counting source that records every batch it serves
//! - Proptest generators for key batches and cache layouts
//! - Test fixtures for the item repository scenarios
//! - Custom assertions for bulk cache results

// Re-export the in-memory store from its source crate
pub use bulkcache_storage::InMemoryCacheStore;

// Re-export core and storage types for convenience
pub use bulkcache_core::{
    BulkCacheError, BulkCacheResult, BulkOperationKind, CacheDefaults, CacheKey, ConfigError,
    CoordinatorConfig, ExpressionError, MethodSignature, OperationDeclaration, ParamShape,
    ReturnShape, SourceError, StoreError, UnlessScope,
};
pub use bulkcache_storage::{
    Argument, BatchCacheCoordinator, BatchStats, CacheElement, CacheHandle, CacheValue,
    ConditionEvaluator, Element, ExpressionRegistry, Invocation, InvocationOutput,
    KeyedCacheStore, ResultView,
};

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing_subscriber::EnvFilter;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// OPERATION LOG
// ============================================================================

/// One observable step of a cached call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Resolve { names: Vec<String> },
    Get { cache: String, key: CacheKey, hit: bool },
    Put { cache: String, key: CacheKey },
    Evict { cache: String, key: CacheKey },
    Proceed { keys: usize },
}

/// Ordered log shared between a store and a source.
#[derive(Debug, Clone, Default)]
pub struct OpLog {
    ops: Arc<Mutex<Vec<Op>>>,
}

impl OpLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, op: Op) {
        lock(&self.ops).push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        lock(&self.ops).clone()
    }

    pub fn clear(&self) {
        lock(&self.ops).clear();
    }

    /// Number of source invocations seen.
    pub fn proceeds(&self) -> usize {
        lock(&self.ops)
            .iter()
            .filter(|op| matches!(op, Op::Proceed { .. }))
            .count()
    }

    /// Keys written, in order, to one cache.
    pub fn puts_to(&self, cache: &str) -> Vec<CacheKey> {
        lock(&self.ops)
            .iter()
            .filter_map(|op| match op {
                Op::Put { cache: c, key } if c == cache => Some(key.clone()),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// MOCK STORES
// ============================================================================

/// In-memory store that logs every call.
pub struct RecordingStore<V> {
    inner: InMemoryCacheStore<V>,
    log: OpLog,
}

impl<V: CacheValue> RecordingStore<V> {
    pub fn new() -> Self {
        Self::with_log(OpLog::new())
    }

    /// Share `log` with a source to observe the order of store and source calls.
    pub fn with_log(log: OpLog) -> Self {
        Self {
            inner: InMemoryCacheStore::new(),
            log,
        }
    }

    pub fn log(&self) -> &OpLog {
        &self.log
    }

    pub fn inner(&self) -> &InMemoryCacheStore<V> {
        &self.inner
    }

    /// Seed an entry without logging it.
    pub async fn seed(&self, cache: &str, key: CacheKey, value: V) -> BulkCacheResult<()> {
        let handles = self.inner.resolve(&[cache.to_string()]).await?;
        for handle in &handles {
            self.inner.put(handle, &key, value.clone()).await?;
        }
        Ok(())
    }
}

impl<V: CacheValue> Default for RecordingStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V: CacheValue> KeyedCacheStore<V> for RecordingStore<V> {
    async fn resolve(&self, names: &[String]) -> BulkCacheResult<Vec<CacheHandle>> {
        self.log.push(Op::Resolve {
            names: names.to_vec(),
        });
        self.inner.resolve(names).await
    }

    async fn get(&self, cache: &CacheHandle, key: &CacheKey) -> BulkCacheResult<Option<V>> {
        let value = self.inner.get(cache, key).await?;
        self.log.push(Op::Get {
            cache: cache.name().to_string(),
            key: key.clone(),
            hit: value.is_some(),
        });
        Ok(value)
    }

    async fn put(&self, cache: &CacheHandle, key: &CacheKey, value: V) -> BulkCacheResult<()> {
        self.inner.put(cache, key, value).await?;
        self.log.push(Op::Put {
            cache: cache.name().to_string(),
            key: key.clone(),
        });
        Ok(())
    }

    async fn evict(&self, cache: &CacheHandle, key: &CacheKey) -> BulkCacheResult<()> {
        self.inner.evict(cache, key).await?;
        self.log.push(Op::Evict {
            cache: cache.name().to_string(),
            key: key.clone(),
        });
        Ok(())
    }
}

/// Store whose selected operations always fail as unavailable.
#[derive(Debug, Clone, Default)]
pub struct FailingStore {
    fail_get: bool,
    fail_put: bool,
    fail_evict: bool,
}

impl FailingStore {
    /// Every data operation fails.
    pub fn unavailable() -> Self {
        Self {
            fail_get: true,
            fail_put: true,
            fail_evict: true,
        }
    }

    /// Reads succeed as misses, writes fail.
    pub fn failing_puts() -> Self {
        Self {
            fail_put: true,
            ..Self::default()
        }
    }

    /// Only evictions fail.
    pub fn failing_evictions() -> Self {
        Self {
            fail_evict: true,
            ..Self::default()
        }
    }

    fn check(&self, failing: bool, cache: &CacheHandle) -> BulkCacheResult<()> {
        if failing {
            Err(StoreError::Unavailable {
                cache: cache.name().to_string(),
                reason: "connection refused".to_string(),
            }
            .into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<V: CacheValue> KeyedCacheStore<V> for FailingStore {
    async fn resolve(&self, names: &[String]) -> BulkCacheResult<Vec<CacheHandle>> {
        Ok(names.iter().map(|name| CacheHandle::new(name.as_str())).collect())
    }

    async fn get(&self, cache: &CacheHandle, _key: &CacheKey) -> BulkCacheResult<Option<V>> {
        self.check(self.fail_get, cache)?;
        Ok(None)
    }

    async fn put(&self, cache: &CacheHandle, _key: &CacheKey, _value: V) -> BulkCacheResult<()> {
        self.check(self.fail_put, cache)
    }

    async fn evict(&self, cache: &CacheHandle, _key: &CacheKey) -> BulkCacheResult<()> {
        self.check(self.fail_evict, cache)
    }
}

// ============================================================================
// COUNTING SOURCE
// ============================================================================

/// Error raised by [`CountingSource::failing_lookup`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("source failed: {0}")]
pub struct SourceFailure(pub String);

/// Underlying source backed by a fixed table.
///
/// Every batch it serves is recorded, and pushed to the shared [`OpLog`] when
/// one is attached.
pub struct CountingSource<K, V> {
    data: HashMap<K, V>,
    batches: Mutex<Vec<Vec<K>>>,
    log: Option<OpLog>,
}

impl<K: CacheElement, V: CacheValue> CountingSource<K, V> {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            data: entries.into_iter().collect(),
            batches: Mutex::new(Vec::new()),
            log: None,
        }
    }

    pub fn with_log(mut self, log: OpLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn data(&self) -> &HashMap<K, V> {
        &self.data
    }

    /// Number of times the source ran.
    pub fn calls(&self) -> usize {
        lock(&self.batches).len()
    }

    /// Key batches served, in call order.
    pub fn batches(&self) -> Vec<Vec<K>> {
        lock(&self.batches).clone()
    }

    /// Every key ever requested, flattened.
    pub fn requested_keys(&self) -> Vec<K> {
        lock(&self.batches).iter().flatten().cloned().collect()
    }

    fn record(&self, keys: &[K]) {
        lock(&self.batches).push(keys.to_vec());
        if let Some(log) = &self.log {
            log.push(Op::Proceed { keys: keys.len() });
        }
    }

    fn serve(&self, args: Vec<Argument<K>>) -> HashMap<K, V> {
        let ids = collection_argument(args);
        self.record(&ids);
        ids.into_iter()
            .filter_map(|id| self.data.get(&id).map(|value| (id.clone(), value.clone())))
            .collect()
    }

    /// Keyed lookup: returns the entries found for the requested ids.
    pub fn lookup<'a>(
        &'a self,
        target: &'a (dyn Any + Send + Sync),
        method: &'a MethodSignature,
        ids: &[K],
    ) -> Invocation<'a, K, V> {
        Invocation::new(
            target,
            method,
            vec![Argument::Collection(ids.to_vec())],
            move |args| async move {
                Ok::<_, SourceError>(InvocationOutput::Mapping(self.serve(args)))
            },
        )
    }

    /// Zero-argument lookup returning the whole table.
    pub fn load_all<'a>(
        &'a self,
        target: &'a (dyn Any + Send + Sync),
        method: &'a MethodSignature,
    ) -> Invocation<'a, K, V> {
        Invocation::new(target, method, Vec::new(), move |_| async move {
            self.record(&[]);
            Ok::<_, SourceError>(InvocationOutput::Mapping(self.data.clone()))
        })
    }

    /// Write returning the saved values unchanged.
    pub fn save<'a>(
        &'a self,
        target: &'a (dyn Any + Send + Sync),
        method: &'a MethodSignature,
        values: Vec<V>,
    ) -> Invocation<'a, K, V> {
        Invocation::new(
            target,
            method,
            vec![Argument::Scalar(serde_json::Value::Null)],
            move |_| async move {
                self.record(&[]);
                Ok::<_, SourceError>(InvocationOutput::Collection(values))
            },
        )
    }

    /// Deletion returning unit.
    pub fn delete<'a>(
        &'a self,
        target: &'a (dyn Any + Send + Sync),
        method: &'a MethodSignature,
        ids: &[K],
    ) -> Invocation<'a, K, V> {
        Invocation::new(
            target,
            method,
            vec![Argument::Collection(ids.to_vec())],
            move |args| async move {
                self.record(&collection_argument(args));
                Ok::<_, SourceError>(InvocationOutput::Unit)
            },
        )
    }

    /// Keyed lookup that records the batch and then fails.
    pub fn failing_lookup<'a>(
        &'a self,
        target: &'a (dyn Any + Send + Sync),
        method: &'a MethodSignature,
        ids: &[K],
    ) -> Invocation<'a, K, V> {
        Invocation::new(
            target,
            method,
            vec![Argument::Collection(ids.to_vec())],
            move |args| async move {
                self.record(&collection_argument(args));
                Err::<InvocationOutput<K, V>, _>(SourceFailure("row lock timeout".to_string()))
            },
        )
    }
}

fn collection_argument<K>(args: Vec<Argument<K>>) -> Vec<K> {
    args.into_iter()
        .find_map(|arg| match arg {
            Argument::Collection(ids) => Some(ids),
            Argument::Scalar(_) => None,
        })
        .unwrap_or_default()
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a `fmt` subscriber filtered by `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bulkcache_storage=warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for key batches and cache layouts.

    use super::fixtures::{Item, ItemId};
    use proptest::prelude::*;

    /// Generate an item id.
    pub fn arb_item_id() -> impl Strategy<Value = ItemId> {
        (0u64..10_000).prop_map(|id| ItemId { id })
    }

    /// Generate an item.
    pub fn arb_item() -> impl Strategy<Value = Item> {
        (0u64..10_000, "[a-z]{1,12}").prop_map(|(id, name)| Item { id, name })
    }

    /// Generate a batch of distinct ids.
    pub fn arb_id_batch(max: usize) -> impl Strategy<Value = Vec<u64>> {
        prop::collection::hash_set(0u64..1_000, 0..=max).prop_map(|ids| ids.into_iter().collect())
    }

    /// Generate a batch of distinct ids with a cached/uncached flag per id.
    pub fn arb_partial_hit(max: usize) -> impl Strategy<Value = (Vec<u64>, Vec<bool>)> {
        arb_id_batch(max).prop_flat_map(|ids| {
            let len = ids.len();
            (Just(ids), prop::collection::vec(any::<bool>(), len))
        })
    }

    /// Generate one to three distinct cache names.
    pub fn arb_cache_names() -> impl Strategy<Value = Vec<String>> {
        prop::collection::btree_set("[a-z]{3,8}", 1..=3).prop_map(|names| names.into_iter().collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for the item repository scenarios.

    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    /// Identifier element of a bulk argument.
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct ItemId {
        pub id: u64,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Item {
        pub id: u64,
        pub name: String,
    }

    /// Target instance handed to invocations.
    #[derive(Debug, Default)]
    pub struct ItemRepository;

    pub const REPOSITORY: &ItemRepository = &ItemRepository;

    pub const SMALL_BATCH: &str = "#ids.size() < 3";
    pub const LARGE_RESULT: &str = "#result.size() > 1";
    pub const RESULT_ID: &str = "#result.id";
    pub const FIRST_ARG_ID: &str = "#p0.id";

    pub fn item(id: u64) -> Item {
        Item {
            id,
            name: format!("item-{}", id),
        }
    }

    pub fn item_ids(ids: &[u64]) -> Vec<ItemId> {
        ids.iter().map(|&id| ItemId { id }).collect()
    }

    /// Table of items keyed by id.
    pub fn items(ids: &[u64]) -> Vec<(ItemId, Item)> {
        ids.iter().map(|&id| (ItemId { id }, item(id))).collect()
    }

    /// `1 -> "a"`, `2 -> "b"`, and so on.
    pub fn lettered(ids: &[u64]) -> Vec<(u64, String)> {
        ids.iter()
            .map(|&id| {
                let letter = char::from_u32('a' as u32 + ((id.saturating_sub(1)) % 26) as u32)
                    .unwrap_or('?');
                (id, letter.to_string())
            })
            .collect()
    }

    pub fn find_by_ids() -> MethodSignature {
        MethodSignature::new(
            "ItemRepository",
            "find_by_ids",
            vec![ParamShape::Collection],
            ReturnShape::Mapping,
        )
    }

    pub fn find_all() -> MethodSignature {
        MethodSignature::new("ItemRepository", "find_all", vec![], ReturnShape::Mapping)
    }

    pub fn save_all() -> MethodSignature {
        MethodSignature::new(
            "ItemRepository",
            "save_all",
            vec![ParamShape::Scalar],
            ReturnShape::Collection,
        )
    }

    pub fn delete_all() -> MethodSignature {
        MethodSignature::new(
            "ItemRepository",
            "delete_all",
            vec![ParamShape::Collection],
            ReturnShape::Unit,
        )
    }

    fn element_id(element: Element<'_, ItemId, Item>) -> Value {
        match element {
            Element::Id(id) => json!(id.id),
            Element::Value(item) => json!(item.id),
            Element::Batch(_) | Element::Absent => Value::Null,
        }
    }

    /// Evaluator understanding the repository's expressions.
    ///
    /// `#result.id` and `#p0.id` both reduce an id or an item to its numeric
    /// id, so reads keyed by `#p0.id` hit entries written through `#result.id`.
    pub fn repository_evaluator() -> ExpressionRegistry<ItemId, Item> {
        ExpressionRegistry::<ItemId, Item>::new()
            .predicate(SMALL_BATCH, |ctx| {
                matches!(ctx.element(), Element::Batch(ids) if ids.len() < 3)
            })
            .predicate(LARGE_RESULT, |ctx| {
                ctx.result().is_some_and(|result| result.len() > 1)
            })
            .rule(RESULT_ID, |ctx| Ok(element_id(ctx.element())))
            .rule(FIRST_ARG_ID, |ctx| Ok(element_id(ctx.element())))
    }

    /// Evaluator for `u64 -> String` scenarios.
    pub fn scalar_evaluator() -> ExpressionRegistry<u64, String> {
        ExpressionRegistry::<u64, String>::new()
            .predicate(SMALL_BATCH, |ctx| {
                matches!(ctx.element(), Element::Batch(ids) if ids.len() < 3)
            })
            .predicate(LARGE_RESULT, |ctx| {
                ctx.result().is_some_and(|result| result.len() > 1)
            })
    }

    /// Coordinator over a recording store for item scenarios.
    pub fn item_coordinator(
        store: Arc<RecordingStore<Item>>,
    ) -> BatchCacheCoordinator<ItemId, Item> {
        BatchCacheCoordinator::<ItemId, Item>::new(store, Arc::new(repository_evaluator()))
    }

    /// Coordinator over a recording store for `u64 -> String` scenarios.
    pub fn scalar_coordinator(
        store: Arc<RecordingStore<String>>,
    ) -> BatchCacheCoordinator<u64, String> {
        BatchCacheCoordinator::<u64, String>::new(store, Arc::new(scalar_evaluator()))
    }

    /// Identity key of a `u64` element.
    pub fn key(id: u64) -> CacheKey {
        CacheKey::from_value(&json!(id))
    }

    /// Identity key of an [`ItemId`].
    pub fn item_key(id: u64) -> CacheKey {
        CacheKey::from_value(&json!({ "id": id }))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for bulk cache results.

    use super::*;
    use std::fmt::Debug;

    /// Assert that a result is Ok.
    #[track_caller]
    pub fn assert_ok<T: Debug>(result: &BulkCacheResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a result is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: Debug>(result: &BulkCacheResult<T>) {
        match result {
            Err(BulkCacheError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a result is a TypeMismatch with the given shapes.
    #[track_caller]
    pub fn assert_type_mismatch<T: Debug>(
        result: &BulkCacheResult<T>,
        expected: ReturnShape,
        found: ReturnShape,
    ) {
        match result {
            Err(BulkCacheError::TypeMismatch {
                expected: e,
                found: f,
            }) => {
                assert_eq!(*e, expected, "Wrong expected shape in TypeMismatch");
                assert_eq!(*f, found, "Wrong found shape in TypeMismatch");
            }
            other => panic!("Expected TypeMismatch, got: {:?}", other),
        }
    }

    /// Assert that a result is a Store error.
    #[track_caller]
    pub fn assert_store_error<T: Debug>(result: &BulkCacheResult<T>) {
        match result {
            Err(BulkCacheError::Store(_)) => {}
            other => panic!("Expected Store error, got: {:?}", other),
        }
    }

    /// Assert that a result is a source error of type `E`.
    #[track_caller]
    pub fn assert_source_error<T: Debug, E: std::error::Error + 'static>(
        result: &BulkCacheResult<T>,
    ) {
        match result {
            Err(err) if err.source_ref::<E>().is_some() => {}
            other => panic!(
                "Expected source error {}, got: {:?}",
                std::any::type_name::<E>(),
                other
            ),
        }
    }

    /// Assert that an output is a mapping equal to `expected`.
    #[track_caller]
    pub fn assert_mapping<K, V>(output: &InvocationOutput<K, V>, expected: &HashMap<K, V>)
    where
        K: CacheElement + Debug,
        V: CacheValue + Debug + PartialEq,
    {
        match output.as_mapping() {
            Some(mapping) => assert_eq!(mapping, expected, "Mapping mismatch"),
            None => panic!("Expected mapping, got {}", output.shape()),
        }
    }

    /// Assert that the source ran exactly `expected` times.
    #[track_caller]
    pub fn assert_source_calls<K: CacheElement, V: CacheValue>(
        source: &CountingSource<K, V>,
        expected: usize,
    ) {
        assert_eq!(
            source.calls(),
            expected,
            "Source invocation count mismatch"
        );
    }

    /// Assert that every eviction in the log precedes the first invocation.
    #[track_caller]
    pub fn assert_evicted_before_proceed(log: &OpLog) {
        let ops = log.ops();
        let proceed = ops
            .iter()
            .position(|op| matches!(op, Op::Proceed { .. }))
            .unwrap_or(ops.len());
        if let Some(late) = ops[proceed..]
            .iter()
            .find(|op| matches!(op, Op::Evict { .. }))
        {
            panic!("Eviction after invocation: {:?}", late);
        }
    }

    /// Assert that nothing was written to any cache.
    #[track_caller]
    pub fn assert_no_puts(log: &OpLog) {
        let puts: Vec<_> = log
            .ops()
            .into_iter()
            .filter(|op| matches!(op, Op::Put { .. }))
            .collect();
        assert!(puts.is_empty(), "Expected no cache writes, got: {:?}", puts);
    }

    /// Assert that no cache was probed.
    #[track_caller]
    pub fn assert_no_probes(log: &OpLog) {
        let probes: Vec<_> = log
            .ops()
            .into_iter()
            .filter(|op| matches!(op, Op::Get { .. }))
            .collect();
        assert!(probes.is_empty(), "Expected no cache probes, got: {:?}", probes);
    }

    /// Assert that a declaration configuration is valid.
    #[track_caller]
    pub fn assert_config_valid(config: &CoordinatorConfig) {
        match config.validate() {
            Ok(()) => {}
            Err(e) => panic!("Config validation failed: {:?}", e),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lettered_fixture() {
        let table = lettered(&[1, 2, 3]);
        assert_eq!(
            table,
            vec![(1, "a".to_string()), (2, "b".to_string()), (3, "c".to_string())]
        );
    }

    #[test]
    fn test_fixture_signatures_build() {
        let read = OperationDeclaration::read().cache("items").build(&find_by_ids());
        assert!(read.is_ok());
        let all = OperationDeclaration::read().cache("items").build(&find_all());
        assert!(all.map(|d| d.is_find_all()).unwrap_or(false));
        let write = OperationDeclaration::write().cache("items").build(&save_all());
        assert!(write.is_ok());
        let evict = OperationDeclaration::evict().cache("items").build(&delete_all());
        assert!(evict.is_ok());
    }

    #[test]
    fn test_item_key_matches_identity() {
        let key = CacheKey::of(&ItemId { id: 4 }).unwrap();
        assert_eq!(key, item_key(4));
    }

    #[test]
    fn test_default_config_is_valid() {
        assertions::assert_config_valid(&CoordinatorConfig::default());
    }

    #[tokio::test]
    async fn test_recording_store_logs_calls() {
        let store = RecordingStore::<String>::new();
        let handles = store.resolve(&["items".to_string()]).await.unwrap();
        store.put(&handles[0], &key(1), "a".to_string()).await.unwrap();
        store.get(&handles[0], &key(1)).await.unwrap();
        store.evict(&handles[0], &key(1)).await.unwrap();

        let ops = store.log().ops();
        assert_eq!(ops.len(), 4);
        assert!(matches!(ops[2], Op::Get { hit: true, .. }));
        assert_eq!(store.log().puts_to("items"), vec![key(1)]);
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = FailingStore::unavailable();
        let handles = KeyedCacheStore::<String>::resolve(&store, &["items".to_string()])
            .await
            .unwrap();
        let result = KeyedCacheStore::<String>::get(&store, &handles[0], &key(1)).await;
        assertions::assert_store_error(&result);

        let reads_ok = FailingStore::failing_puts();
        let result = KeyedCacheStore::<String>::get(&reads_ok, &handles[0], &key(1)).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_counting_source_records_batches() {
        let log = OpLog::new();
        let source = CountingSource::new(lettered(&[1, 2])).with_log(log.clone());
        let method = find_by_ids();

        let output = source
            .lookup(REPOSITORY, &method, &[1, 2, 5])
            .proceed()
            .await
            .unwrap();
        let mapping = output.into_mapping().unwrap();
        assert_eq!(mapping.len(), 2);
        assertions::assert_source_calls(&source, 1);
        assert_eq!(source.requested_keys(), vec![1, 2, 5]);
        assert_eq!(log.proceeds(), 1);
    }

    #[tokio::test]
    async fn test_failing_lookup() {
        let source: CountingSource<u64, String> = CountingSource::new(Vec::new());
        let method = find_by_ids();
        let result = source.failing_lookup(REPOSITORY, &method, &[1]).proceed().await;
        assertions::assert_source_error::<_, SourceFailure>(&result);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_partial_hit_flags_match_batch((ids, cached) in generators::arb_partial_hit(16)) {
            prop_assert_eq!(ids.len(), cached.len());
        }

        #[test]
        fn prop_cache_names_are_valid(names in generators::arb_cache_names()) {
            let defaults = CacheDefaults::with_caches(names);
            prop_assert!(defaults.validate().is_ok());
        }
    }
}
