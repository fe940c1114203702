//! Ledger error taxonomy.
//!
//! Callers see three kinds of failure, exposed through [`LedgerError::kind`]:
//! - **NotConfigured**: no pools are configured (or the configuration is invalid)
//! - **NotFound**: the DID is absent from every configured pool
//! - **Ledger**: anything else, carrying the originating pool and cause

use std::{fmt, path::PathBuf};

use snafu::Snafu;
use vdr_cache::CacheError;
use vdr_types::ConfigError;

use crate::client::{ClientError, ClientErrorKind, RequestKind};

/// Result type alias for ledger operations.
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// The caller-visible category of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No ledgers are configured.
    NotConfigured,
    /// The requested record does not exist.
    NotFound,
    /// Any other ledger failure.
    Ledger,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "not_configured"),
            Self::NotFound => write!(f, "not_found"),
            Self::Ledger => write!(f, "ledger"),
        }
    }
}

/// Failure to establish a pool connection.
///
/// Cloneable so every caller waiting on the same connection attempt receives
/// the same outcome.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnectError {
    /// Inline genesis transactions could not be written to disk.
    #[snafu(display("Failed to write genesis file {}: {message}", path.display()))]
    GenesisWrite {
        /// Genesis file path.
        path: PathBuf,
        /// I/O error description.
        message: String,
    },

    /// Creating the local pool configuration failed.
    #[snafu(display("Failed to create pool configuration: {source}"))]
    Create {
        /// Client error.
        source: ClientError,
    },

    /// Opening the connection failed.
    #[snafu(display("Failed to open pool connection: {source}"))]
    Open {
        /// Client error.
        source: ClientError,
    },

    /// The connection task ended without producing a result.
    #[snafu(display("Connection attempt aborted: {message}"))]
    Aborted {
        /// Description of the abort.
        message: String,
    },
}

/// Ledger operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LedgerError {
    /// No pools are configured.
    #[snafu(display(
        "No indy ledgers configured. Provide at least one pool configuration in the resolver \
         configuration"
    ))]
    NotConfigured,

    /// The resolver configuration is invalid.
    #[snafu(display("Invalid ledger configuration: {source}"))]
    Config {
        /// Validation error.
        source: ConfigError,
    },

    /// The requested record does not exist.
    #[snafu(display("{message}"))]
    NotFound {
        /// Description naming what was not found and where.
        message: String,
    },

    /// The ledger rejected or did not acknowledge a request.
    #[snafu(display("Ledger '{pool_id}' rejected {operation} transaction request: {reason}"))]
    Rejected {
        /// Pool that rejected the request.
        pool_id: String,
        /// Whether it was a read or write request.
        operation: RequestKind,
        /// Reason given by the ledger.
        reason: String,
    },

    /// `connect()` was called while a connection attempt was in flight.
    #[snafu(display("Cannot attempt connection to ledger '{pool_id}', already connecting"))]
    AlreadyConnecting {
        /// Pool being connected.
        pool_id: String,
    },

    /// Connecting to a pool failed.
    #[snafu(display("Error connecting to ledger '{pool_id}': {source}"))]
    Connection {
        /// Pool that failed to connect.
        pool_id: String,
        /// Connection failure.
        source: ConnectError,
    },

    /// The ledger network client failed.
    #[snafu(display("Ledger '{pool_id}' request failed: {source}"))]
    Client {
        /// Pool the request was sent to.
        pool_id: String,
        /// Client error.
        source: ClientError,
    },

    /// A ledger reply could not be interpreted.
    #[snafu(display("Invalid response from ledger '{pool_id}': {message}"))]
    InvalidResponse {
        /// Pool that sent the response.
        pool_id: String,
        /// Description of the problem.
        message: String,
    },

    /// No pool resolved a DID and at least one failed unexpectedly.
    #[snafu(display("Unknown error retrieving did '{did}' from '{failed}' of '{total}' ledgers"))]
    Unresolved {
        /// DID being resolved.
        did: String,
        /// Pools that failed with something other than not-found.
        failed: usize,
        /// Pools queried.
        total: usize,
        /// First unexpected failure.
        source: Box<LedgerError>,
    },

    /// The ledger requires an author agreement but the pool has none configured.
    #[snafu(display(
        "Please, specify a transaction author agreement with version and acceptance mechanism \
         for ledger '{pool_id}'. The ledger requires version {version} with one of {mechanisms}"
    ))]
    AuthorAgreementRequired {
        /// Pool the write was addressed to.
        pool_id: String,
        /// Agreement version the ledger requires.
        version: String,
        /// Acceptance mechanisms the ledger offers.
        mechanisms: String,
    },

    /// The configured author agreement does not match the ledger's.
    #[snafu(display(
        "Unable to satisfy matching TAA with mechanism \"{mechanism}\" and version \"{version}\" \
         in pool '{pool_id}'. Found {ledger_mechanisms} and version {ledger_version} in pool."
    ))]
    AuthorAgreementMismatch {
        /// Pool the write was addressed to.
        pool_id: String,
        /// Configured acceptance mechanism.
        mechanism: String,
        /// Configured agreement version.
        version: String,
        /// Acceptance mechanisms the ledger offers.
        ledger_mechanisms: String,
        /// Agreement version the ledger requires.
        ledger_version: String,
    },

    /// A fan-out branch terminated without a result.
    #[snafu(display("Request to ledger '{pool_id}' did not complete: {message}"))]
    BranchFailed {
        /// Pool the branch queried.
        pool_id: String,
        /// Description of the termination.
        message: String,
    },

    /// The DID cache failed.
    #[snafu(display("DID cache error: {source}"))]
    Cache {
        /// Cache error.
        source: CacheError,
    },
}

impl LedgerError {
    /// Returns the caller-visible category of this error.
    ///
    /// A client reporting [`ClientErrorKind::LedgerNotFound`] counts as
    /// not-found, like an empty `GET_NYM` reply.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured | Self::Config { .. } => ErrorKind::NotConfigured,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Client { source, .. } if source.kind() == ClientErrorKind::LedgerNotFound => {
                ErrorKind::NotFound
            },
            _ => ErrorKind::Ledger,
        }
    }

    /// Returns true if retrying the operation may succeed.
    ///
    /// Retryable errors:
    /// - Connection failures (the pool resets and reconnects on the next call)
    /// - Client timeouts and transport failures
    /// - `AlreadyConnecting` (the in-flight attempt will settle)
    /// - Aborted fan-out branches
    ///
    /// Aggregate failures are retryable when their cause is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::AlreadyConnecting { .. } | Self::BranchFailed { .. } => {
                true
            },
            Self::Client { source, .. } => {
                matches!(source.kind(), ClientErrorKind::Timeout | ClientErrorKind::Transport)
            },
            Self::Rejected { .. } => false,
            Self::Unresolved { source, .. } => source.is_retryable(),
            Self::NotConfigured
            | Self::Config { .. }
            | Self::NotFound { .. }
            | Self::InvalidResponse { .. }
            | Self::AuthorAgreementRequired { .. }
            | Self::AuthorAgreementMismatch { .. }
            | Self::Cache { .. } => false,
        }
    }
}
