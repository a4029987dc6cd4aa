//! Declared bulk cache operations.
//!
//! An [`OperationDeclaration`] is the immutable description of one bulk
//! operation attached to a method: which kind it is, which caches it targets,
//! how per-element keys are derived, and which condition/unless expressions
//! gate it. Declarations are built (and validated) once against the method's
//! [`MethodSignature`]; the coordinator receives them already resolved.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CacheDefaults, ConfigError, MethodSignature, ParamShape, ReturnShape};

/// An opaque expression handed to the condition evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression(String);

impl Expression {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Expression {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Expression {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// The three bulk semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BulkOperationKind {
    /// Read-through with partial-hit resolution.
    /// `find_all` is set when the method takes no key argument.
    BulkRead { find_all: bool },
    /// Write-through: always invoke, then cache every returned element
    BulkWrite,
    /// Evict every key of the batch before invoking
    BulkEvict,
}

impl BulkOperationKind {
    pub fn is_read(&self) -> bool {
        matches!(self, Self::BulkRead { .. })
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::BulkWrite)
    }

    pub fn is_evict(&self) -> bool {
        matches!(self, Self::BulkEvict)
    }
}

impl fmt::Display for BulkOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BulkRead { .. } => f.write_str("bulk-read"),
            Self::BulkWrite => f.write_str("bulk-write"),
            Self::BulkEvict => f.write_str("bulk-evict"),
        }
    }
}

/// How a single element becomes a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeyStrategy {
    /// Natural identity of the element
    #[default]
    Identity,
    /// Expression evaluated with the element bound as the current element
    Expression(Expression),
    /// Named key generator registered with the coordinator
    Generator(String),
}

/// Where the caches named by a declaration are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CacheSource {
    /// The coordinator's default store
    #[default]
    Default,
    /// A named cache manager
    Manager(String),
    /// A named cache resolver
    Resolver(String),
}

/// Granularity of the `unless` veto on mapping results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnlessScope {
    /// Evaluate once against the whole returned mapping
    #[default]
    WholeResult,
    /// Evaluate once per returned entry
    PerEntry,
}

/// Immutable descriptor of one declared bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDeclaration {
    name: String,
    kind: BulkOperationKind,
    cache_names: Vec<String>,
    key: KeyStrategy,
    condition: Option<Expression>,
    unless: Option<Expression>,
    cache_source: CacheSource,
    unless_scope: UnlessScope,
}

impl OperationDeclaration {
    /// Start declaring a bulk read-through operation.
    pub fn read() -> OperationDeclarationBuilder {
        OperationDeclarationBuilder::new(DeclaredKind::Read)
    }

    /// Start declaring a bulk write-through operation.
    pub fn write() -> OperationDeclarationBuilder {
        OperationDeclarationBuilder::new(DeclaredKind::Write)
    }

    /// Start declaring a bulk evict operation.
    pub fn evict() -> OperationDeclarationBuilder {
        OperationDeclarationBuilder::new(DeclaredKind::Evict)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BulkOperationKind {
        self.kind
    }

    pub fn cache_names(&self) -> &[String] {
        &self.cache_names
    }

    pub fn key(&self) -> &KeyStrategy {
        &self.key
    }

    pub fn condition(&self) -> Option<&Expression> {
        self.condition.as_ref()
    }

    pub fn unless(&self) -> Option<&Expression> {
        self.unless.as_ref()
    }

    pub fn cache_source(&self) -> &CacheSource {
        &self.cache_source
    }

    pub fn unless_scope(&self) -> UnlessScope {
        self.unless_scope
    }

    /// True when the operation materializes the whole source.
    pub fn is_find_all(&self) -> bool {
        matches!(self.kind, BulkOperationKind::BulkRead { find_all: true })
    }
}

impl fmt::Display for OperationDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] caches={:?} | key='",
            self.kind, self.name, self.cache_names
        )?;
        match &self.key {
            KeyStrategy::Identity => {}
            KeyStrategy::Expression(expr) => write!(f, "{}", expr)?,
            KeyStrategy::Generator(name) => write!(f, "@{}", name)?,
        }
        write!(
            f,
            "' | condition='{}' | unless='{}' | isFindAll='{}'",
            self.condition.as_ref().map(Expression::as_str).unwrap_or(""),
            self.unless.as_ref().map(Expression::as_str).unwrap_or(""),
            self.is_find_all()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclaredKind {
    Read,
    Write,
    Evict,
}

/// Builder for [`OperationDeclaration`].
///
/// Mirrors the attributes a cache declaration may carry. Conflicting
/// attributes are accepted by the setters and rejected by [`build`].
///
/// [`build`]: OperationDeclarationBuilder::build
#[derive(Debug, Clone)]
pub struct OperationDeclarationBuilder {
    kind: DeclaredKind,
    cache_names: Vec<String>,
    key: Option<Expression>,
    key_generator: Option<String>,
    condition: Option<Expression>,
    unless: Option<Expression>,
    cache_manager: Option<String>,
    cache_resolver: Option<String>,
    unless_scope: UnlessScope,
}

impl OperationDeclarationBuilder {
    fn new(kind: DeclaredKind) -> Self {
        Self {
            kind,
            cache_names: Vec::new(),
            key: None,
            key_generator: None,
            condition: None,
            unless: None,
            cache_manager: None,
            cache_resolver: None,
            unless_scope: UnlessScope::default(),
        }
    }

    /// Append one cache name.
    pub fn cache(mut self, name: impl Into<String>) -> Self {
        self.cache_names.push(name.into());
        self
    }

    /// Replace the cache names.
    pub fn cache_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn key(mut self, expression: impl Into<Expression>) -> Self {
        self.key = non_blank(expression.into());
        self
    }

    pub fn key_generator(mut self, name: impl Into<String>) -> Self {
        self.key_generator = Some(name.into()).filter(|n: &String| !n.trim().is_empty());
        self
    }

    pub fn condition(mut self, expression: impl Into<Expression>) -> Self {
        self.condition = non_blank(expression.into());
        self
    }

    pub fn unless(mut self, expression: impl Into<Expression>) -> Self {
        self.unless = non_blank(expression.into());
        self
    }

    pub fn cache_manager(mut self, name: impl Into<String>) -> Self {
        self.cache_manager = Some(name.into()).filter(|n: &String| !n.trim().is_empty());
        self
    }

    pub fn cache_resolver(mut self, name: impl Into<String>) -> Self {
        self.cache_resolver = Some(name.into()).filter(|n: &String| !n.trim().is_empty());
        self
    }

    pub fn unless_scope(mut self, scope: UnlessScope) -> Self {
        self.unless_scope = scope;
        self
    }

    /// Apply class-level defaults. Explicit attributes always win.
    pub fn with_defaults(mut self, defaults: &CacheDefaults) -> Self {
        if self.cache_names.is_empty() {
            self.cache_names = defaults.cache_names.clone();
        }
        if self.key.is_none() && self.key_generator.is_none() {
            self.key_generator = defaults.key_generator.clone();
        }
        if self.cache_manager.is_none() && self.cache_resolver.is_none() {
            if defaults.cache_resolver.is_some() {
                self.cache_resolver = defaults.cache_resolver.clone();
            } else if defaults.cache_manager.is_some() {
                self.cache_manager = defaults.cache_manager.clone();
            }
        }
        self
    }

    /// Validate against the method signature and build the declaration.
    pub fn build(self, method: &MethodSignature) -> Result<OperationDeclaration, ConfigError> {
        let name = method.qualified_name();

        let kind = match self.kind {
            DeclaredKind::Read => {
                expect_returns(&name, method, ReturnShape::Mapping)?;
                let find_all = method.is_find_all();
                if !find_all && method.params != [ParamShape::Collection] {
                    return Err(ConfigError::CollectionArgument {
                        found: method.collection_params(),
                    });
                }
                BulkOperationKind::BulkRead { find_all }
            }
            DeclaredKind::Write => {
                expect_returns(&name, method, ReturnShape::Collection)?;
                BulkOperationKind::BulkWrite
            }
            DeclaredKind::Evict => {
                let found = method.collection_params();
                if found != 1 {
                    return Err(ConfigError::CollectionArgument { found });
                }
                BulkOperationKind::BulkEvict
            }
        };

        if self.cache_names.is_empty() {
            return Err(ConfigError::MissingCacheNames { operation: name });
        }

        if self.cache_manager.is_some() && self.cache_resolver.is_some() {
            return Err(ConfigError::IncompatibleOptions {
                operation: name,
                option_a: "cache_manager".to_string(),
                option_b: "cache_resolver".to_string(),
            });
        }

        if self.key.is_some() && self.key_generator.is_some() {
            return Err(ConfigError::IncompatibleOptions {
                operation: name,
                option_a: "key".to_string(),
                option_b: "key_generator".to_string(),
            });
        }

        if matches!(kind, BulkOperationKind::BulkRead { find_all: true }) && self.condition.is_some()
        {
            return Err(ConfigError::ConditionOnFindAll { operation: name });
        }

        let key = match (self.key, self.key_generator) {
            (Some(expr), _) => KeyStrategy::Expression(expr),
            (None, Some(generator)) => KeyStrategy::Generator(generator),
            (None, None) => KeyStrategy::Identity,
        };

        let cache_source = match (self.cache_manager, self.cache_resolver) {
            (Some(manager), _) => CacheSource::Manager(manager),
            (None, Some(resolver)) => CacheSource::Resolver(resolver),
            (None, None) => CacheSource::Default,
        };

        Ok(OperationDeclaration {
            name,
            kind,
            cache_names: self.cache_names,
            key,
            condition: self.condition,
            unless: self.unless,
            cache_source,
            unless_scope: self.unless_scope,
        })
    }
}

fn non_blank(expression: Expression) -> Option<Expression> {
    if expression.as_str().trim().is_empty() {
        None
    } else {
        Some(expression)
    }
}

fn expect_returns(
    operation: &str,
    method: &MethodSignature,
    expected: ReturnShape,
) -> Result<(), ConfigError> {
    if method.returns == expected {
        Ok(())
    } else {
        Err(ConfigError::InvalidReturnShape {
            operation: operation.to_string(),
            expected,
            found: method.returns,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
