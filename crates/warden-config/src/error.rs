//! Error types for configuration loading and validation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Primary error type for configuration operations.
///
/// Every variant is startup-fatal: configuration is loaded exactly once,
/// before any watcher or deployment exists.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("configuration file unreadable")]
    Unreadable {
        /// Path of the configuration file.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// Configuration file was not a valid JSON document of target entries.
    #[error("configuration file malformed")]
    Malformed {
        /// Path of the configuration file.
        path: PathBuf,
        /// Source deserialization error.
        source: serde_json::Error,
    },
    /// Configuration file contained no deployment targets.
    #[error("configuration contains no deployment targets")]
    Empty {
        /// Path of the configuration file.
        path: PathBuf,
    },
    /// A target entry failed validation.
    #[error("invalid value for '{field}' in target entry {index}: {reason}")]
    InvalidEntry {
        /// Zero-based index of the offending entry.
        index: usize,
        /// Field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// A target entry's match pattern did not compile.
    #[error("invalid match pattern in target entry {index}")]
    InvalidPattern {
        /// Zero-based index of the offending entry.
        index: usize,
        /// The raw pattern string.
        pattern: String,
        /// Source pattern compilation error.
        source: regex::Error,
    },
}
