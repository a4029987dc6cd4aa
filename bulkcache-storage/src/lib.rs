//! BULKCACHE Storage - Batch Cache Coordination
//!
//! Splits a collection of requested keys into cache hits and misses, fetches
//! only the misses from the underlying source in one call, merges, and
//! populates the cache per element. Stores and expression evaluators are
//! pluggable traits; an in-memory store ships for tests and embedding.

pub mod cache;

pub use cache::{
    Argument, BatchCacheCoordinator, BatchStats, CacheElement, CacheHandle, CacheStats,
    CacheValue, CandidateKeySet, ConditionEvaluator, Element, EvaluationContext,
    ExpressionRegistry, InMemoryCacheStore, Invocation, InvocationOutput, KeyGenerator,
    KeyedCacheStore, OperationContext, ProceedFuture, ResultView,
};

// Re-export core types for API integration
pub use bulkcache_core::{
    BulkCacheError, BulkCacheResult, BulkOperationKind, CacheKey, ConfigError,
    CoordinatorConfig, Expression, MethodSignature, OperationDeclaration, ParamShape,
    ReturnShape,
};
