//! Error types for deployment attempts.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for deployment attempts.
///
/// None of these variants is fatal to the process: a failed attempt leaves
/// the application at its previous version and the next matching artifact
/// write retries naturally.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The HTTP client could not be initialized (startup-time only).
    #[error("http client initialization failed")]
    Client {
        /// Source client build error.
        source: reqwest::Error,
    },
    /// The artifact could not be read from disk.
    #[error("artifact unreadable")]
    Read {
        /// Path of the artifact.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The deploy request failed at the transport level.
    #[error("deploy request failed")]
    Request {
        /// URL used for the request.
        url: String,
        /// Source HTTP client error.
        source: reqwest::Error,
    },
    /// The manager answered with a non-200 status.
    #[error("deploy rejected by manager with status {status}")]
    Rejected {
        /// URL used for the request.
        url: String,
        /// HTTP status code returned by the manager.
        status: u16,
    },
}
