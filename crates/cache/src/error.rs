//! Cache and record storage errors.

use std::path::PathBuf;

use snafu::{Location, Snafu};

/// Result type alias for cache and storage operations.
pub type Result<T, E = CacheError> = std::result::Result<T, E>;

/// Errors raised by [`RecordStorage`](crate::RecordStorage) backends and
/// [`PersistedLruCache`](crate::PersistedLruCache).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CacheError {
    /// A record with this id already exists.
    #[snafu(display("Record with id '{id}' already exists"))]
    DuplicateKey {
        /// Record id.
        id: String,
    },

    /// No record with this id exists.
    #[snafu(display("Record with id '{id}' not found"))]
    RecordNotFound {
        /// Record id.
        id: String,
    },

    /// The cache was used from a context other than the one it first served.
    #[snafu(display(
        "Persisted LRU cache is bound to context '{expected}' and cannot be used from context \
         '{actual}'. Do not share one cache instance across agent contexts"
    ))]
    ContextMismatch {
        /// Correlation id of the owning context.
        expected: String,
        /// Correlation id of the rejected context.
        actual: String,
    },

    /// A record could not be encoded or decoded.
    #[snafu(display("Serialization error at {location}: {source}"))]
    Serialization {
        /// Underlying JSON error.
        source: serde_json::Error,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// A storage file operation failed.
    #[snafu(display("I/O error on {}: {source}", path.display()))]
    Io {
        /// File or directory the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The cache was created with a limit of zero.
    #[snafu(display("Cache limit must be greater than zero"))]
    InvalidLimit,
}

impl CacheError {
    /// Returns true if this error reports an already existing record.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}
