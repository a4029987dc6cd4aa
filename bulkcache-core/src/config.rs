//! Configuration types

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Defaults shared by every declaration on one type.
///
/// Applied with [`OperationDeclarationBuilder::with_defaults`]; an attribute
/// set on the declaration itself is never overridden.
///
/// [`OperationDeclarationBuilder::with_defaults`]: crate::OperationDeclarationBuilder::with_defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheDefaults {
    pub cache_names: Vec<String>,
    pub key_generator: Option<String>,
    pub cache_manager: Option<String>,
    pub cache_resolver: Option<String>,
}

impl CacheDefaults {
    /// Defaults that only name caches.
    pub fn with_caches<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cache_names: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Validate the defaults.
    ///
    /// Validates:
    /// - no blank cache name
    /// - cache_manager and cache_resolver are not both set
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(blank) = self.cache_names.iter().find(|n| n.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "cache_names".to_string(),
                value: format!("{:?}", blank),
                reason: "cache names must not be blank".to_string(),
            });
        }

        if self.cache_manager.is_some() && self.cache_resolver.is_some() {
            return Err(ConfigError::IncompatibleOptions {
                operation: "defaults".to_string(),
                option_a: "cache_manager".to_string(),
                option_b: "cache_resolver".to_string(),
            });
        }

        Ok(())
    }
}

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Defaults applied to declarations built through the coordinator
    pub defaults: CacheDefaults,
    /// Collect hit/miss/invocation counters
    pub stats_enabled: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            defaults: CacheDefaults::default(),
            stats_enabled: true,
        }
    }
}

impl CoordinatorConfig {
    /// Parse a TOML document and validate it.
    ///
    /// ```toml
    /// stats_enabled = true
    ///
    /// [defaults]
    /// cache_names = ["items"]
    /// cache_manager = "primary"
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::InvalidValue {
            field: "toml".to_string(),
            value: text.lines().next().unwrap_or_default().to_string(),
            reason: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.defaults.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.stats_enabled);
        assert!(config.defaults.cache_names.is_empty());
    }

    #[test]
    fn test_from_toml_str() {
        let config = CoordinatorConfig::from_toml_str(
            r#"
            stats_enabled = false

            [defaults]
            cache_names = ["items", "items-mirror"]
            key_generator = "itemKey"
            "#,
        )
        .unwrap();

        assert!(!config.stats_enabled);
        assert_eq!(config.defaults.cache_names, vec!["items", "items-mirror"]);
        assert_eq!(config.defaults.key_generator.as_deref(), Some("itemKey"));
        assert!(config.defaults.cache_manager.is_none());
    }

    #[test]
    fn test_from_toml_str_rejects_manager_and_resolver() {
        let err = CoordinatorConfig::from_toml_str(
            r#"
            [defaults]
            cache_manager = "primary"
            cache_resolver = "tenant"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::IncompatibleOptions { .. }));
    }

    #[test]
    fn test_from_toml_str_rejects_malformed_document() {
        let err = CoordinatorConfig::from_toml_str("stats_enabled = \"maybe\"").unwrap_err();
        match err {
            ConfigError::InvalidValue { field, .. } => assert_eq!(field, "toml"),
            other => panic!("Expected InvalidValue, got: {:?}", other),
        }
    }

    #[test]
    fn test_blank_cache_name_is_rejected() {
        let defaults = CacheDefaults::with_caches(["items", " "]);
        let err = defaults.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
