//! # Design
//!
//! - Centralize application-level errors for bootstrap and coordination.
//! - Keep error messages constant while carrying context fields for
//!   debugging.
//! - Only startup conditions surface here; steady-state deployment and
//!   watch outcomes stay inside the coordinator loop.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("configuration failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: warden_config::ConfigError,
    },
    /// A folder watch subscription could not be established at startup.
    #[error("watch subscription failed")]
    Watch {
        /// Source watch error.
        source: warden_watch::WatchError,
    },
    /// The deploy client could not be initialized.
    #[error("deploy client initialization failed")]
    Deploy {
        /// Source deploy error.
        source: warden_deploy::DeployError,
    },
}
