//! Writer configuration
//!
//! Loaded once at startup from TOML and immutable afterwards:
//!
//! ```toml
//! service_name = "office"
//! timeout_ms = 30000
//!
//! [namespaces]
//! cm = "http://www.alfresco.org/model/content/1.0"
//!
//! [[mapping]]
//! property = "Title"
//! attribute = "cm:title"
//!
//! [[converter]]
//! kind = "date"
//! format = "%Y-%m-%d"
//!
//! [pool]
//! max_workers = 64
//! shutdown_grace_ms = 5000
//! ```

use crate::convert::ConverterConfig;
use crate::error::ConfigError;
use crate::model::{MDW_PREFIX, MDW_URI};
use mdw_repo::NamespaceRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default dispatch timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// One `property = attribute` pair of the mapping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Target property name inside the artifact
    pub property: String,
    /// Repository attribute, `prefix:local` or `{uri}local`
    pub attribute: String,
}

impl MappingEntry {
    #[inline]
    #[must_use]
    pub fn new(property: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            attribute: attribute.into(),
        }
    }
}

/// Worker pool limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on concurrently running writes
    pub max_workers: usize,
    /// How long stop waits for in-flight writes
    pub shutdown_grace_ms: u64,
}

impl PoolConfig {
    #[inline]
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 512,
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Metadata service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriterConfig {
    /// Name the service registers under
    pub service_name: String,
    /// Dispatch timeout in milliseconds
    pub timeout_ms: u64,
    /// Prefix to namespace URI
    pub namespaces: BTreeMap<String, String>,
    /// Ordered mapping table
    pub mapping: Vec<MappingEntry>,
    /// Ordered converter chain
    pub converter: Vec<ConverterConfig>,
    /// Worker pool limits
    pub pool: PoolConfig,
}

impl WriterConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `ConfigError::Parse` or `ConfigError::Invalid`.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`WriterConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), service = %config.service_name, "configuration loaded");
        Ok(config)
    }

    #[inline]
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    /// Append a mapping entry; order is preserved
    #[inline]
    #[must_use]
    pub fn with_mapping(mut self, property: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.mapping.push(MappingEntry::new(property, attribute));
        self
    }

    #[inline]
    #[must_use]
    pub fn with_converter(mut self, converter: ConverterConfig) -> Self {
        self.converter.push(converter);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Dispatch timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Namespace registry with the configured prefixes plus `mdw`
    #[must_use]
    pub fn namespace_registry(&self) -> NamespaceRegistry {
        let mut registry = NamespaceRegistry::new().with(MDW_PREFIX, MDW_URI);
        for (prefix, uri) in &self.namespaces {
            registry.register(prefix.clone(), uri.clone());
        }
        registry
    }

    /// Check values that would make the service unusable
    ///
    /// Unresolvable mapping entries are not checked here; they are dropped
    /// with a warning when the mapping table is built.
    ///
    /// # Errors
    /// `ConfigError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::Invalid("service_name must not be empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be greater than zero".into()));
        }
        if self.pool.max_workers == 0 {
            return Err(ConfigError::Invalid("pool.max_workers must be greater than zero".into()));
        }
        if let Some(entry) = self.mapping.iter().find(|e| e.property.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "mapping for '{}' has an empty property name",
                entry.attribute
            )));
        }
        for converter in &self.converter {
            converter.build()?;
        }
        Ok(())
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            service_name: "metadataWriter".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            namespaces: BTreeMap::new(),
            mapping: Vec::new(),
            converter: Vec::new(),
            pool: PoolConfig::default(),
        }
    }
}
