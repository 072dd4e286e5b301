//! Error types for folder watching.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for folder watching.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The filesystem-event subscription could not be established for a
    /// folder. Fatal at startup; logged and skipped on a mid-run respawn.
    #[error("folder watch subscription failed")]
    Subscribe {
        /// Folder the subscription was requested for.
        folder: PathBuf,
        /// Source notification error.
        source: notify::Error,
    },
}
