//! Error types for bulk cache operations

use crate::ReturnShape;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error produced by the underlying (uncached) invocation.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Declaration and argument-shape errors.
///
/// These are programming/configuration mistakes. They are raised either when a
/// declaration is built or on the first invocation that exposes them, and are
/// never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Expected exactly one collection argument, found {found}")]
    CollectionArgument { found: usize },

    #[error("Invalid return shape on '{operation}': expected {expected}, found {found}")]
    InvalidReturnShape {
        operation: String,
        expected: ReturnShape,
        found: ReturnShape,
    },

    #[error("Cannot use 'condition' on find-all operation '{operation}'")]
    ConditionOnFindAll { operation: String },

    #[error("Incompatible options on '{operation}': {option_a} and {option_b}")]
    IncompatibleOptions {
        operation: String,
        option_a: String,
        option_b: String,
    },

    #[error("No cache names declared for '{operation}'")]
    MissingCacheNames { operation: String },

    #[error("Unknown key generator: {name}")]
    UnknownKeyGenerator { name: String },

    #[error("Unknown cache source: {name}")]
    UnknownCacheSource { name: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Condition, unless and key expression failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("Unknown expression: {expression}")]
    Unknown { expression: String },

    #[error("Expression '{expression}' must evaluate to a boolean, got {found}")]
    NotBoolean { expression: String, found: String },

    #[error("Evaluation of '{expression}' failed: {reason}")]
    EvaluationFailed { expression: String, reason: String },

    #[error("Cannot derive a cache key: {reason}")]
    KeyDerivation { reason: String },
}

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Cache not found: {name}")]
    CacheNotFound { name: String },

    #[error("Cache '{cache}' unavailable: {reason}")]
    Unavailable { cache: String, reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Master error type for all bulk cache errors.
#[derive(Debug, Clone, Error)]
pub enum BulkCacheError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Type mismatch: expected {expected} result, got {found}")]
    TypeMismatch {
        expected: ReturnShape,
        found: ReturnShape,
    },

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invocation failed: {0}")]
    Source(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl BulkCacheError {
    /// Wrap an error raised by the underlying invocation.
    pub fn from_source(err: SourceError) -> Self {
        Self::Source(Arc::from(err))
    }

    /// Downcast a source error back to the type the invocation raised.
    pub fn source_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Source(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Returns true for configuration errors.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for bulk cache operations.
pub type BulkCacheResult<T> = Result<T, BulkCacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("row lock timeout")]
    struct RowLockTimeout;

    #[test]
    fn test_config_error_display_collection_argument() {
        let err = ConfigError::CollectionArgument { found: 2 };
        let msg = format!("{}", err);
        assert!(msg.contains("exactly one collection argument"));
        assert!(msg.contains('2'));
    }

    #[test]
    fn test_config_error_display_return_shape() {
        let err = ConfigError::InvalidReturnShape {
            operation: "Repo::find_by_ids".to_string(),
            expected: ReturnShape::Mapping,
            found: ReturnShape::Collection,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Repo::find_by_ids"));
        assert!(msg.contains("mapping"));
        assert!(msg.contains("collection"));
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = BulkCacheError::TypeMismatch {
            expected: ReturnShape::Mapping,
            found: ReturnShape::Unit,
        };
        assert_eq!(format!("{}", err), "Type mismatch: expected mapping result, got unit");
    }

    #[test]
    fn test_source_error_downcast() {
        let err = BulkCacheError::from_source(Box::new(RowLockTimeout));
        assert!(err.source_ref::<RowLockTimeout>().is_some());
        assert!(!err.is_config());
        assert!(format!("{}", err).contains("row lock timeout"));
    }

    #[test]
    fn test_from_conversions() {
        let err: BulkCacheError = ConfigError::MissingCacheNames {
            operation: "op".to_string(),
        }
        .into();
        assert!(err.is_config());

        let err: BulkCacheError = StoreError::LockPoisoned.into();
        assert!(matches!(err, BulkCacheError::Store(StoreError::LockPoisoned)));
    }
}
