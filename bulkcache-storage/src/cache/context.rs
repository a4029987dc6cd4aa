//! Per-invocation operation context.

use std::any::Any;

use bulkcache_core::{
    BulkCacheResult, CacheKey, ConfigError, Expression, ExpressionError, KeyStrategy,
    MethodSignature, OperationDeclaration,
};
use serde_json::Value;

use super::evaluator::{ConditionEvaluator, Element, EvaluationContext, ResultView};
use super::traits::{CacheElement, CacheHandle, CacheValue, KeyGenerator, KeyedCacheStore};

/// Binds one declared operation to one invocation.
///
/// Every key or condition computation binds its element for exactly that
/// computation; nothing element-specific is kept between calls. Resolved
/// cache handles are memoized for the lifetime of the context.
pub struct OperationContext<'a, K, V> {
    declaration: &'a OperationDeclaration,
    method: &'a MethodSignature,
    target: &'a (dyn Any + Send + Sync),
    evaluator: &'a dyn ConditionEvaluator<K, V>,
    key_generator: Option<&'a dyn KeyGenerator<K, V>>,
    caches: Option<Vec<CacheHandle>>,
}

impl<'a, K: CacheElement, V: CacheValue> OperationContext<'a, K, V> {
    /// Bind `declaration` to one call of `method` on `target`.
    pub fn new(
        declaration: &'a OperationDeclaration,
        method: &'a MethodSignature,
        target: &'a (dyn Any + Send + Sync),
        evaluator: &'a dyn ConditionEvaluator<K, V>,
    ) -> Self {
        Self {
            declaration,
            method,
            target,
            evaluator,
            key_generator: None,
            caches: None,
        }
    }

    /// Attach the generator named by the declaration's key strategy.
    pub fn with_key_generator(mut self, generator: &'a dyn KeyGenerator<K, V>) -> Self {
        self.key_generator = Some(generator);
        self
    }

    /// The declaration this context was built for.
    pub fn declaration(&self) -> &'a OperationDeclaration {
        self.declaration
    }

    /// Signature of the intercepted method.
    pub fn method(&self) -> &'a MethodSignature {
        self.method
    }

    /// Key for one element of the bulk argument.
    pub fn generate_key(&self, element: &K) -> BulkCacheResult<CacheKey> {
        self.key_for(Element::Id(element))
    }

    /// Key for one value returned by a write-through invocation.
    pub fn generate_value_key(&self, value: &V) -> BulkCacheResult<CacheKey> {
        self.key_for(Element::Value(value))
    }

    fn key_for(&self, element: Element<'_, K, V>) -> BulkCacheResult<CacheKey> {
        match self.declaration.key() {
            KeyStrategy::Identity => element.identity_key(),
            KeyStrategy::Expression(expression) => {
                let value = self
                    .evaluator
                    .evaluate(expression, &self.evaluation(element, None))?;
                Ok(CacheKey::from_value(&value))
            }
            KeyStrategy::Generator(name) => {
                let generator =
                    self.key_generator
                        .ok_or_else(|| ConfigError::UnknownKeyGenerator {
                            name: name.clone(),
                        })?;
                generator.generate(self.method, element)
            }
        }
    }

    /// Batch-level pre-invocation gate.
    ///
    /// The whole candidate set is bound as the current element. True when no
    /// condition is declared.
    pub fn is_eligible_by_condition(&self, candidates: &[K]) -> BulkCacheResult<bool> {
        match self.declaration.condition() {
            None => Ok(true),
            Some(condition) => {
                let value = self
                    .evaluator
                    .evaluate(condition, &self.evaluation(Element::Batch(candidates), None))?;
                expect_bool(condition, value)
            }
        }
    }

    /// Post-invocation veto. No element is bound; returns the negation of
    /// `unless`, or true when no `unless` is declared.
    pub fn is_eligible_to_cache(&self, result: ResultView<'_, K, V>) -> BulkCacheResult<bool> {
        match self.declaration.unless() {
            None => Ok(true),
            Some(unless) => {
                let value = self
                    .evaluator
                    .evaluate(unless, &self.evaluation(Element::Absent, Some(result)))?;
                Ok(!expect_bool(unless, value)?)
            }
        }
    }

    /// Resolve the declared cache names through `store`, once.
    pub async fn resolve_caches(&mut self, store: &dyn KeyedCacheStore<V>) -> BulkCacheResult<()> {
        if self.caches.is_none() {
            let handles = store.resolve(self.declaration.cache_names()).await?;
            self.caches = Some(handles);
        }
        Ok(())
    }

    /// Resolved caches in declaration order; empty before `resolve_caches`.
    pub fn caches(&self) -> &[CacheHandle] {
        self.caches.as_deref().unwrap_or_default()
    }

    fn evaluation<'e>(
        &self,
        element: Element<'e, K, V>,
        result: Option<ResultView<'e, K, V>>,
    ) -> EvaluationContext<'e, K, V>
    where
        'a: 'e,
    {
        EvaluationContext::new(self.method, self.target, element, result)
    }
}

fn expect_bool(expression: &Expression, value: Value) -> BulkCacheResult<bool> {
    match value {
        Value::Bool(flag) => Ok(flag),
        other => Err(ExpressionError::NotBoolean {
            expression: expression.to_string(),
            found: other.to_string(),
        }
        .into()),
    }
}
