//! JSON configuration loading and validation.

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::DeployTarget;

/// Load and validate the deployment targets from a JSON configuration
/// file: an array of entries carrying `tomcat`, `username`, `password`,
/// `folder`, `regex` and an optional `appname`.
///
/// An empty `appname` is normalized to absent so name derivation only has
/// one "unset" shape to deal with. Match patterns are compiled later, when
/// the pattern registry is built.
///
/// # Errors
///
/// Returns an error if the file is unreadable, is not valid JSON, contains
/// no entries, or any entry has an empty endpoint, folder or pattern. All
/// of these are startup-fatal.
pub fn load_config(path: &Path) -> ConfigResult<Vec<DeployTarget>> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let mut targets: Vec<DeployTarget> =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    if targets.is_empty() {
        return Err(ConfigError::Empty {
            path: path.to_path_buf(),
        });
    }
    for (index, target) in targets.iter_mut().enumerate() {
        validate_entry(index, target)?;
        if target.app_name.as_deref().is_some_and(str::is_empty) {
            target.app_name = None;
        }
    }
    Ok(targets)
}

fn validate_entry(index: usize, target: &DeployTarget) -> ConfigResult<()> {
    if target.endpoint.is_empty() {
        return Err(ConfigError::InvalidEntry {
            index,
            field: "tomcat",
            reason: "must not be empty",
        });
    }
    if target.folder.as_os_str().is_empty() {
        return Err(ConfigError::InvalidEntry {
            index,
            field: "folder",
            reason: "must not be empty",
        });
    }
    if target.pattern.is_empty() {
        return Err(ConfigError::InvalidEntry {
            index,
            field: "regex",
            reason: "must not be empty",
        });
    }
    Ok(())
}
