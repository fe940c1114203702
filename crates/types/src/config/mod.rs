//! Configuration types for multi-ledger resolution.
//!
//! Configuration is supplied once at startup, either programmatically through
//! the validated builders or loaded from a TOML file. Every config struct also
//! exposes `validate()` for use after deserialization.

// The schemars `JsonSchema` derive expands to code using `.unwrap()`.
#![allow(clippy::unwrap_used)]

mod pool;
mod resolver;

pub use pool::*;
pub use resolver::*;
use snafu::Snafu;

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range or
/// violates a cross-field constraint.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// The configuration file could not be read.
    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    Read {
        /// Path of the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected schema.
    #[snafu(display("failed to parse config: {source}"))]
    Parse {
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}
