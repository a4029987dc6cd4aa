//! Expression evaluation seam.
//!
//! Condition, unless and key expressions are opaque to the cache layer. They
//! are handed to a [`ConditionEvaluator`] together with an
//! [`EvaluationContext`] describing the method, the target, the element
//! currently being keyed and, after invocation, the result.

use std::any::Any;
use std::collections::HashMap;

use bulkcache_core::{BulkCacheResult, CacheKey, Expression, ExpressionError, MethodSignature};
use serde_json::Value;

use super::traits::{CacheElement, CacheValue};

/// The element bound for one evaluation.
///
/// A binding lives only as long as the single key/condition computation it
/// was created for.
#[derive(Debug)]
pub enum Element<'a, K, V> {
    /// Nothing bound (result-based decisions)
    Absent,
    /// One element of the bulk argument
    Id(&'a K),
    /// The whole candidate set (batch-level condition)
    Batch(&'a [K]),
    /// One value returned by a write-through invocation
    Value(&'a V),
}

impl<K, V> Clone for Element<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for Element<'_, K, V> {}

impl<'a, K: CacheElement, V: CacheValue> Element<'a, K, V> {
    /// Natural-identity key of the bound element.
    pub fn identity_key(&self) -> BulkCacheResult<CacheKey> {
        match self {
            Self::Id(id) => CacheKey::of(*id),
            Self::Value(value) => CacheKey::of(*value),
            Self::Batch(_) | Self::Absent => Err(ExpressionError::KeyDerivation {
                reason: "no single element bound".to_string(),
            }
            .into()),
        }
    }

    /// JSON view of the bound element, `Null` when nothing is bound.
    pub fn to_value(&self) -> BulkCacheResult<Value> {
        let value = match self {
            Self::Absent => Ok(Value::Null),
            Self::Id(id) => serde_json::to_value(id),
            Self::Batch(ids) => serde_json::to_value(ids),
            Self::Value(value) => serde_json::to_value(value),
        };
        value.map_err(|e| {
            ExpressionError::KeyDerivation {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Invocation result visible to `unless` expressions.
#[derive(Debug)]
pub enum ResultView<'a, K, V> {
    /// The whole mapping returned by the source
    Mapping(&'a HashMap<K, V>),
    /// One entry of that mapping
    Entry(&'a K, &'a V),
}

impl<K, V> Clone for ResultView<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for ResultView<'_, K, V> {}

impl<K, V> ResultView<'_, K, V> {
    /// Number of entries in view.
    pub fn len(&self) -> usize {
        match self {
            Self::Mapping(mapping) => mapping.len(),
            Self::Entry(..) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything an expression may refer to.
pub struct EvaluationContext<'a, K, V> {
    method: &'a MethodSignature,
    target: &'a (dyn Any + Send + Sync),
    element: Element<'a, K, V>,
    result: Option<ResultView<'a, K, V>>,
}

impl<'a, K, V> EvaluationContext<'a, K, V> {
    pub fn new(
        method: &'a MethodSignature,
        target: &'a (dyn Any + Send + Sync),
        element: Element<'a, K, V>,
        result: Option<ResultView<'a, K, V>>,
    ) -> Self {
        Self {
            method,
            target,
            element,
            result,
        }
    }

    pub fn method(&self) -> &'a MethodSignature {
        self.method
    }

    pub fn target(&self) -> &'a (dyn Any + Send + Sync) {
        self.target
    }

    /// Downcast the target instance.
    pub fn target_as<T: Any>(&self) -> Option<&'a T> {
        self.target.downcast_ref::<T>()
    }

    pub fn element(&self) -> Element<'a, K, V> {
        self.element
    }

    pub fn result(&self) -> Option<ResultView<'a, K, V>> {
        self.result
    }
}

/// Opaque expression evaluator.
///
/// Returns an arbitrary JSON value: conditions and unless expressions must
/// produce a boolean, key expressions any value.
pub trait ConditionEvaluator<K, V>: Send + Sync {
    fn evaluate(
        &self,
        expression: &Expression,
        context: &EvaluationContext<'_, K, V>,
    ) -> BulkCacheResult<Value>;
}

type Rule<K, V> =
    Box<dyn Fn(&EvaluationContext<'_, K, V>) -> BulkCacheResult<Value> + Send + Sync + 'static>;

/// Evaluator that maps exact expression text to registered closures.
///
/// This is not an expression language: every expression a declaration uses
/// must be registered verbatim.
///
/// ```ignore
/// let evaluator = ExpressionRegistry::<ItemId, Item>::new()
///     .predicate("#ids.size() < 3", |ctx| matches!(ctx.element(), Element::Batch(ids) if ids.len() < 3))
///     .rule("#result.id", |ctx| match ctx.element() {
///         Element::Value(item) => Ok(json!(item.id)),
///         _ => Ok(Value::Null),
///     });
/// ```
pub struct ExpressionRegistry<K, V> {
    rules: HashMap<String, Rule<K, V>>,
}

impl<K, V> Default for ExpressionRegistry<K, V> {
    fn default() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }
}

impl<K, V> ExpressionRegistry<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value-producing expression.
    pub fn rule<F>(mut self, expression: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&EvaluationContext<'_, K, V>) -> BulkCacheResult<Value> + Send + Sync + 'static,
    {
        self.rules.insert(expression.into(), Box::new(rule));
        self
    }

    /// Register a boolean expression.
    pub fn predicate<F>(self, expression: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&EvaluationContext<'_, K, V>) -> bool + Send + Sync + 'static,
    {
        self.rule(expression, move |ctx| Ok(Value::Bool(predicate(ctx))))
    }

    pub fn contains(&self, expression: &str) -> bool {
        self.rules.contains_key(expression)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<K, V> ConditionEvaluator<K, V> for ExpressionRegistry<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    fn evaluate(
        &self,
        expression: &Expression,
        context: &EvaluationContext<'_, K, V>,
    ) -> BulkCacheResult<Value> {
        let rule = self
            .rules
            .get(expression.as_str())
            .ok_or_else(|| ExpressionError::Unknown {
                expression: expression.to_string(),
            })?;
        rule(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkcache_core::{BulkCacheError, ParamShape, ReturnShape};
    use serde_json::json;

    struct Repo;

    fn method() -> MethodSignature {
        MethodSignature::new(
            "Repo",
            "find_by_ids",
            vec![ParamShape::Collection],
            ReturnShape::Mapping,
        )
    }

    #[test]
    fn test_registry_evaluates_registered_rules() {
        let registry = ExpressionRegistry::<u64, String>::new()
            .predicate("#ids.size() < 3", |ctx| {
                matches!(ctx.element(), Element::Batch(ids) if ids.len() < 3)
            })
            .rule("#p0 * 10", |ctx| match ctx.element() {
                Element::Id(id) => Ok(json!(id * 10)),
                _ => Ok(Value::Null),
            });

        let method = method();
        let ids = [1u64, 2];
        let ctx = EvaluationContext::new(&method, &Repo, Element::Batch(&ids), None);
        let value = registry.evaluate(&"#ids.size() < 3".into(), &ctx).unwrap();
        assert_eq!(value, Value::Bool(true));

        let ctx = EvaluationContext::new(&method, &Repo, Element::Id(&7), None);
        let value = registry.evaluate(&"#p0 * 10".into(), &ctx).unwrap();
        assert_eq!(value, json!(70));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unknown_expression_is_an_error() {
        let registry = ExpressionRegistry::<u64, String>::new();
        let method = method();
        let ctx = EvaluationContext::new(&method, &Repo, Element::Absent, None);
        let err = registry.evaluate(&"#missing".into(), &ctx).unwrap_err();
        assert!(matches!(
            err,
            BulkCacheError::Expression(ExpressionError::Unknown { .. })
        ));
    }

    #[test]
    fn test_target_downcast() {
        let method = method();
        let ctx: EvaluationContext<'_, u64, String> =
            EvaluationContext::new(&method, &Repo, Element::Absent, None);
        assert!(ctx.target_as::<Repo>().is_some());
        assert!(ctx.target_as::<String>().is_none());
    }

    #[test]
    fn test_identity_key_requires_single_element() {
        let id = 3u64;
        let element: Element<'_, u64, String> = Element::Id(&id);
        assert_eq!(element.identity_key().unwrap(), CacheKey::of(&3u64).unwrap());

        let ids = [1u64, 2];
        let batch: Element<'_, u64, String> = Element::Batch(&ids);
        assert!(batch.identity_key().is_err());
        assert_eq!(batch.to_value().unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_result_view_len() {
        let mapping: HashMap<u64, String> =
            [(1, "a".to_string()), (2, "b".to_string())].into_iter().collect();
        assert_eq!(ResultView::Mapping(&mapping).len(), 2);
        assert_eq!(ResultView::<u64, String>::Entry(&1, &"a".to_string()).len(), 1);
    }
}
