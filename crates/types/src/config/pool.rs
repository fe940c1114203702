//! Ledger pool configuration.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Where the genesis transactions for a ledger pool come from.
///
/// In TOML this is a single-key table:
///
/// ```toml
/// genesis = { path = "/etc/ledgers/sovrin.txn" }
/// # or
/// genesis = { transactions = "{\"reqSignature\":{}, ...}" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenesisSource {
    /// Path to an existing genesis transactions file.
    Path(PathBuf),
    /// Genesis transactions supplied inline. They are written to a file under
    /// the data directory the first time the pool connects.
    Transactions(String),
}

impl GenesisSource {
    /// Creates a genesis source pointing at an existing file.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Creates a genesis source from inline transactions.
    pub fn transactions(transactions: impl Into<String>) -> Self {
        Self::Transactions(transactions.into())
    }
}

/// The transaction author agreement (TAA) a pool's writes are accepted under.
///
/// Ledgers that publish an agreement refuse writes that do not carry an
/// acceptance of it. The configured version must match the ledger's current
/// agreement, and the mechanism must be one the ledger lists.
///
/// ```toml
/// transaction_author_agreement = { version = "1", acceptance_mechanism = "accept" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TransactionAuthorAgreement {
    /// Agreement version the operator accepted.
    pub version: String,
    /// Acceptance mechanism label, e.g. `"accept"` or `"service_agreement"`.
    pub acceptance_mechanism: String,
}

impl TransactionAuthorAgreement {
    /// Creates an agreement acceptance for `version` using `acceptance_mechanism`.
    pub fn new(version: impl Into<String>, acceptance_mechanism: impl Into<String>) -> Self {
        Self { version: version.into(), acceptance_mechanism: acceptance_mechanism.into() }
    }
}

/// Configuration of a single ledger network (pool).
///
/// Pools are configured once at startup and never mutated. The order in which
/// pools are configured is the operator's preference ranking: the first pool
/// is the write pool, and ties during resolution go to the earliest pool.
///
/// # Validation Rules
///
/// - `id` must be non-empty and contain no whitespace
/// - inline genesis transactions must be non-empty
/// - `indy_namespace`, when set, must be non-empty
/// - `transaction_author_agreement`, when set, needs a non-empty version and
///   acceptance mechanism
///
/// # Example
///
/// ```no_run
/// # use vdr_types::{GenesisSource, LedgerPoolConfig};
/// let config = LedgerPoolConfig::builder()
///     .id("sovrinMain")
///     .is_production(true)
///     .genesis(GenesisSource::path("/etc/ledgers/sovrin.txn"))
///     .indy_namespace("sovrin")
///     .build()
///     .expect("valid pool config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerPoolConfig {
    /// Unique pool identifier. Also names the local pool configuration and
    /// the genesis file written for inline transactions.
    pub id: String,
    /// Whether this pool is a production network.
    #[serde(default)]
    pub is_production: bool,
    /// Genesis transactions used to bootstrap the connection.
    pub genesis: GenesisSource,
    /// `did:indy` namespace served by this pool. Defaults to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indy_namespace: Option<String>,
    /// Agreement accepted for write requests on this pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_author_agreement: Option<TransactionAuthorAgreement>,
}

#[bon::bon]
impl LedgerPoolConfig {
    /// Creates a new pool configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value violates the rules
    /// listed on [`LedgerPoolConfig`].
    #[builder]
    pub fn new(
        #[builder(into)] id: String,
        #[builder(default)] is_production: bool,
        genesis: GenesisSource,
        #[builder(into)] indy_namespace: Option<String>,
        transaction_author_agreement: Option<TransactionAuthorAgreement>,
    ) -> Result<Self, ConfigError> {
        let config =
            Self { id, is_production, genesis, indy_namespace, transaction_author_agreement };
        config.validate()?;
        Ok(config)
    }
}

impl LedgerPoolConfig {
    /// Returns the `did:indy` namespace of this pool, falling back to its id.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.indy_namespace.as_deref().unwrap_or(&self.id)
    }

    /// File name used for inline genesis transactions: `genesis-<id>.txn`,
    /// with the id percent-encoded (including `.`) so distinct ids never
    /// share a file and no id can name a path outside the genesis directory.
    #[must_use]
    pub fn genesis_file_name(&self) -> String {
        let id = urlencoding::encode(&self.id).replace('.', "%2E");
        format!("genesis-{id}.txn")
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::Validation { message: "pool id cannot be empty".to_string() });
        }
        if self.id.contains(char::is_whitespace) {
            return Err(ConfigError::Validation {
                message: format!("pool id cannot contain whitespace, got '{}'", self.id),
            });
        }
        if let GenesisSource::Transactions(transactions) = &self.genesis {
            if transactions.trim().is_empty() {
                return Err(ConfigError::Validation {
                    message: format!("pool '{}': genesis transactions cannot be empty", self.id),
                });
            }
        }
        if matches!(self.indy_namespace.as_deref(), Some("")) {
            return Err(ConfigError::Validation {
                message: format!("pool '{}': indy_namespace cannot be empty", self.id),
            });
        }
        if let Some(taa) = &self.transaction_author_agreement {
            if taa.version.is_empty() || taa.acceptance_mechanism.is_empty() {
                return Err(ConfigError::Validation {
                    message: format!(
                        "pool '{}': transaction author agreement needs a version and an \
                         acceptance mechanism",
                        self.id
                    ),
                });
            }
        }
        Ok(())
    }
}
