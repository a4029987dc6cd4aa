//! The intercepted call.
//!
//! An [`Invocation`] carries the target, the method, the arguments, and a
//! one-shot `proceed` callable performing the real (uncached) work. Calling
//! `proceed` consumes the invocation, so the source runs at most once.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use bulkcache_core::{
    BulkCacheError, BulkCacheResult, ConfigError, MethodSignature, ReturnShape, SourceError,
};
use futures_util::future::BoxFuture;
use serde_json::Value;

use super::traits::{CacheElement, CacheValue};

/// One argument of the intercepted call.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument<K> {
    /// The bulk argument: each element is keyed individually
    Collection(Vec<K>),
    /// Any other argument, passed through untouched
    Scalar(Value),
}

/// What the underlying source produced.
#[derive(Debug, Clone)]
pub enum InvocationOutput<K, V> {
    Mapping(HashMap<K, V>),
    Collection(Vec<V>),
    Unit,
    Value(Value),
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for InvocationOutput<K, V> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Mapping(a), Self::Mapping(b)) => a == b,
            (Self::Collection(a), Self::Collection(b)) => a == b,
            (Self::Unit, Self::Unit) => true,
            (Self::Value(a), Self::Value(b)) => a == b,
            _ => false,
        }
    }
}

impl<K, V> InvocationOutput<K, V> {
    pub fn shape(&self) -> ReturnShape {
        match self {
            Self::Mapping(_) => ReturnShape::Mapping,
            Self::Collection(_) => ReturnShape::Collection,
            Self::Unit => ReturnShape::Unit,
            Self::Value(_) => ReturnShape::Value,
        }
    }

    /// Take the mapping, or fail with a type mismatch.
    pub fn into_mapping(self) -> BulkCacheResult<HashMap<K, V>> {
        match self {
            Self::Mapping(mapping) => Ok(mapping),
            other => Err(BulkCacheError::TypeMismatch {
                expected: ReturnShape::Mapping,
                found: other.shape(),
            }),
        }
    }

    /// Take the collection, or fail with a type mismatch.
    pub fn into_collection(self) -> BulkCacheResult<Vec<V>> {
        match self {
            Self::Collection(values) => Ok(values),
            other => Err(BulkCacheError::TypeMismatch {
                expected: ReturnShape::Collection,
                found: other.shape(),
            }),
        }
    }

    pub fn as_mapping(&self) -> Option<&HashMap<K, V>> {
        match self {
            Self::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }
}

/// Future returned by the underlying source.
pub type ProceedFuture<'a, K, V> = BoxFuture<'a, Result<InvocationOutput<K, V>, SourceError>>;

type Proceed<'a, K, V> = Box<dyn FnOnce(Vec<Argument<K>>) -> ProceedFuture<'a, K, V> + Send + 'a>;

/// Keys extracted from the single collection argument.
///
/// Always a copy: resolving hits shrinks this set, never the caller's
/// argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateKeySet<K> {
    position: usize,
    keys: Vec<K>,
}

impl<K> CandidateKeySet<K> {
    /// Index of the collection argument in the argument list.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drop every key flagged as resolved. `resolved` is parallel to `keys()`.
    pub fn remove_resolved(&mut self, resolved: &[bool]) {
        let mut flags = resolved.iter();
        self.keys
            .retain(|_| !flags.next().copied().unwrap_or(false));
    }

    pub fn into_keys(self) -> Vec<K> {
        self.keys
    }
}

/// A call intercepted by the dispatch layer.
pub struct Invocation<'a, K, V> {
    target: &'a (dyn Any + Send + Sync),
    method: &'a MethodSignature,
    arguments: Vec<Argument<K>>,
    proceed: Proceed<'a, K, V>,
}

impl<'a, K: CacheElement, V: CacheValue> Invocation<'a, K, V> {
    /// Wrap a call. `proceed` receives the (possibly narrowed) arguments.
    pub fn new<F, Fut, E>(
        target: &'a (dyn Any + Send + Sync),
        method: &'a MethodSignature,
        arguments: Vec<Argument<K>>,
        proceed: F,
    ) -> Self
    where
        F: FnOnce(Vec<Argument<K>>) -> Fut + Send + 'a,
        Fut: Future<Output = Result<InvocationOutput<K, V>, E>> + Send + 'a,
        E: Into<SourceError> + 'a,
    {
        Self {
            target,
            method,
            arguments,
            proceed: Box::new(move |args| -> ProceedFuture<'a, K, V> {
                Box::pin(async move { proceed(args).await.map_err(Into::into) })
            }),
        }
    }

    pub fn target(&self) -> &'a (dyn Any + Send + Sync) {
        self.target
    }

    pub fn method(&self) -> &'a MethodSignature {
        self.method
    }

    pub fn arguments(&self) -> &[Argument<K>] {
        &self.arguments
    }

    /// Copy the keys of the single collection argument.
    pub fn bulk_argument(&self) -> BulkCacheResult<CandidateKeySet<K>> {
        let mut collections = self
            .arguments
            .iter()
            .enumerate()
            .filter_map(|(position, arg)| match arg {
                Argument::Collection(keys) => Some((position, keys)),
                Argument::Scalar(_) => None,
            });

        match (collections.next(), collections.next()) {
            (Some((position, keys)), None) => Ok(CandidateKeySet {
                position,
                keys: keys.clone(),
            }),
            (None, _) => Err(ConfigError::CollectionArgument { found: 0 }.into()),
            (Some(_), Some(_)) => Err(ConfigError::CollectionArgument {
                found: 2 + collections.count(),
            }
            .into()),
        }
    }

    /// Run the underlying call with the original arguments.
    pub async fn proceed(self) -> BulkCacheResult<InvocationOutput<K, V>> {
        (self.proceed)(self.arguments)
            .await
            .map_err(BulkCacheError::from_source)
    }

    /// Run the underlying call with `candidates` substituted for the
    /// collection argument they were extracted from.
    pub async fn proceed_with(
        mut self,
        candidates: CandidateKeySet<K>,
    ) -> BulkCacheResult<InvocationOutput<K, V>> {
        let position = candidates.position;
        if let Some(slot) = self.arguments.get_mut(position) {
            *slot = Argument::Collection(candidates.into_keys());
        }
        self.proceed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkcache_core::ParamShape;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Repo;

    fn method() -> MethodSignature {
        MethodSignature::new(
            "Repo",
            "find_by_ids",
            vec![ParamShape::Collection],
            ReturnShape::Mapping,
        )
    }

    fn echo<'a>(
        method: &'a MethodSignature,
        arguments: Vec<Argument<u64>>,
    ) -> Invocation<'a, u64, String> {
        Invocation::new(&Repo, method, arguments, |args| async move {
            let mut out = HashMap::new();
            for arg in args {
                if let Argument::Collection(ids) = arg {
                    for id in ids {
                        out.insert(id, format!("v{}", id));
                    }
                }
            }
            Ok::<_, SourceError>(InvocationOutput::Mapping(out))
        })
    }

    #[test]
    fn test_bulk_argument_copies_keys() {
        let method = method();
        let invocation = echo(
            &method,
            vec![Argument::Scalar(json!("tenant")), Argument::Collection(vec![1, 2, 3])],
        );
        let mut candidates = invocation.bulk_argument().unwrap();
        assert_eq!(candidates.position(), 1);
        assert_eq!(candidates.keys(), &[1, 2, 3]);

        candidates.remove_resolved(&[true, false, true]);
        assert_eq!(candidates.keys(), &[2]);
        assert_eq!(
            invocation.arguments()[1],
            Argument::Collection(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_bulk_argument_requires_exactly_one_collection() {
        let method = method();
        let none = echo(&method, vec![Argument::Scalar(json!(1))]);
        let err = none.bulk_argument().unwrap_err();
        assert!(matches!(
            err,
            BulkCacheError::Config(ConfigError::CollectionArgument { found: 0 })
        ));

        let three = echo(
            &method,
            vec![
                Argument::Collection(vec![1]),
                Argument::Collection(vec![2]),
                Argument::Collection(vec![3]),
            ],
        );
        let err = three.bulk_argument().unwrap_err();
        assert!(matches!(
            err,
            BulkCacheError::Config(ConfigError::CollectionArgument { found: 3 })
        ));
    }

    #[tokio::test]
    async fn test_proceed_with_substitutes_candidates() {
        let method = method();
        let invocation = echo(&method, vec![Argument::Collection(vec![1, 2, 3])]);
        let mut candidates = invocation.bulk_argument().unwrap();
        candidates.remove_resolved(&[true, false, false]);

        let mapping = invocation
            .proceed_with(candidates)
            .await
            .unwrap()
            .into_mapping()
            .unwrap();
        assert_eq!(mapping.len(), 2);
        assert!(!mapping.contains_key(&1));
        assert_eq!(mapping.get(&3).map(String::as_str), Some("v3"));
    }

    #[tokio::test]
    async fn test_proceed_runs_source_once() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let method = method();
        let invocation: Invocation<'_, u64, String> =
            Invocation::new(&Repo, &method, vec![], move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SourceError>(InvocationOutput::Unit)
            });
        let output = invocation.proceed().await.unwrap();
        assert_eq!(output, InvocationOutput::Unit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_source_error_is_propagated() {
        let method = method();
        let invocation: Invocation<'_, u64, String> =
            Invocation::new(&Repo, &method, vec![], |_| async {
                Err::<InvocationOutput<u64, String>, _>(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "db timeout",
                ))
            });
        let err = invocation.proceed().await.unwrap_err();
        let io = err.source_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_output_shape_mismatch() {
        let output: InvocationOutput<u64, String> = InvocationOutput::Collection(vec![]);
        let err = output.into_mapping().unwrap_err();
        assert!(matches!(
            err,
            BulkCacheError::TypeMismatch {
                expected: ReturnShape::Mapping,
                found: ReturnShape::Collection,
            }
        ));
    }
}
