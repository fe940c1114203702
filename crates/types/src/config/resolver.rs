//! Resolver configuration: the ordered pool list, data directory and DID cache sizing.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::{ConfigError, LedgerPoolConfig, ParseSnafu, ReadSnafu};

/// Record id of the persisted DID-to-pool cache.
pub const DEFAULT_CACHE_ID: &str = "DID_POOL_CACHE";

/// Maximum number of DID-to-pool mappings kept in the cache.
pub const DEFAULT_CACHE_LIMIT: usize = 500;

/// Configuration for the multi-ledger resolver.
///
/// # Validation Rules
///
/// - every pool must be valid on its own
/// - pool ids must be unique
/// - `cache_limit` must be > 0
/// - `cache_id` must be non-empty
///
/// An empty pool list is a valid configuration. Resolution and write-pool
/// lookups then fail with a not-configured error.
///
/// # Example
///
/// ```no_run
/// # use vdr_types::ResolverConfig;
/// let config = ResolverConfig::from_toml_str(r#"
///     data_dir = "/var/lib/agent"
///
///     [[pools]]
///     id = "sovrinMain"
///     is_production = true
///     genesis = { path = "/etc/ledgers/sovrin.txn" }
/// "#).expect("valid resolver config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResolverConfig {
    /// Ledger pools in order of preference. The first pool is the write pool.
    #[serde(default)]
    pub pools: Vec<LedgerPoolConfig>,
    /// Agent data directory. Genesis files for inline transactions live under
    /// `<data_dir>/genesis`.
    pub data_dir: PathBuf,
    /// Maximum number of entries in the DID-to-pool cache.
    #[serde(default = "default_cache_limit")]
    pub cache_limit: usize,
    /// Record id under which the DID-to-pool cache is persisted.
    #[serde(default = "default_cache_id")]
    pub cache_id: String,
}

#[bon::bon]
impl ResolverConfig {
    /// Creates a new resolver configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any rule listed on
    /// [`ResolverConfig`] is violated.
    #[builder]
    pub fn new(
        #[builder(default)] pools: Vec<LedgerPoolConfig>,
        #[builder(into)] data_dir: PathBuf,
        #[builder(default = DEFAULT_CACHE_LIMIT)] cache_limit: usize,
        #[builder(into, default = DEFAULT_CACHE_ID.to_string())] cache_id: String,
    ) -> Result<Self, ConfigError> {
        let config = Self { pools, data_dir, cache_limit, cache_id };
        config.validate()?;
        Ok(config)
    }
}

impl ResolverConfig {
    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Validation`] for invalid values.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).context(ParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise the
    /// errors of [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(ReadSnafu { path })?;
        Self::from_toml_str(&contents)
    }

    /// Directory holding genesis files written from inline transactions.
    #[must_use]
    pub fn genesis_dir(&self) -> PathBuf {
        self.data_dir.join("genesis")
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::with_capacity(self.pools.len());
        for pool in &self.pools {
            pool.validate()?;
            if !seen.insert(pool.id.as_str()) {
                return Err(ConfigError::Validation {
                    message: format!("duplicate pool id '{}'", pool.id),
                });
            }
        }
        if self.cache_limit == 0 {
            return Err(ConfigError::Validation {
                message: "cache_limit must be > 0".to_string(),
            });
        }
        if self.cache_id.is_empty() {
            return Err(ConfigError::Validation {
                message: "cache_id cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn default_cache_limit() -> usize {
    DEFAULT_CACHE_LIMIT
}

fn default_cache_id() -> String {
    DEFAULT_CACHE_ID.to_string()
}
