//! Batch-aware read-through / write-through cache layer.
//!
//! # Flow
//!
//! A dispatch layer hands [`BatchCacheCoordinator::execute`] the declarations
//! attached to a method plus the [`Invocation`] it intercepted. The
//! coordinator picks one bulk semantic, builds a single [`OperationContext`]
//! for the call, and runs:
//!
//! - **bulk read**: probe every candidate key, forward only the misses to the
//!   source (once), merge, and backfill the cache entry by entry
//! - **find-all**: invoke, then cache every returned entry individually
//! - **bulk write**: invoke, then cache every returned element
//! - **bulk evict**: evict every candidate key, then invoke
//!
//! # Example
//!
//! ```ignore
//! let coordinator = BatchCacheCoordinator::new(store, evaluator);
//! let declaration = coordinator.declare(OperationDeclaration::read().cache("items"), &method)?;
//!
//! let invocation = Invocation::new(&repo, &method, vec![Argument::Collection(ids)], |args| async move {
//!     repo.load(args).await
//! });
//! let items = coordinator.execute(&[declaration], invocation).await?.into_mapping()?;
//! ```

pub mod context;
pub mod coordinator;
pub mod evaluator;
pub mod invocation;
pub mod memory;
pub mod traits;

pub use context::OperationContext;
pub use coordinator::{BatchCacheCoordinator, BatchStats};
pub use evaluator::{ConditionEvaluator, Element, EvaluationContext, ExpressionRegistry, ResultView};
pub use invocation::{Argument, CandidateKeySet, Invocation, InvocationOutput, ProceedFuture};
pub use memory::InMemoryCacheStore;
pub use traits::{CacheElement, CacheHandle, CacheStats, CacheValue, KeyGenerator, KeyedCacheStore};
