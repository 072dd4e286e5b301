//! Typed deployment-target model.
//!
//! # Design
//! - Pure data carriers constructed once from the configuration file.
//! - Targets are immutable for the process lifetime; per-event artifact
//!   paths travel alongside a target, never on it.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use sha2::{Digest, Sha256};

/// One configured deployment destination: a manager endpoint plus the
/// watched folder and match pattern that feed it.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct DeployTarget {
    /// Base URL of the Tomcat manager API.
    #[serde(rename = "tomcat")]
    pub endpoint: String,
    /// Manager account user.
    pub username: String,
    /// Manager account password.
    pub password: String,
    /// Directory watched for artifact writes.
    pub folder: PathBuf,
    /// Artifact match pattern (regular-expression syntax), tested against
    /// full event paths.
    #[serde(rename = "regex")]
    pub pattern: String,
    /// Explicit application name; derived from the artifact filename when
    /// absent.
    #[serde(rename = "appname", default)]
    pub app_name: Option<String>,
}

impl DeployTarget {
    /// Identity key of the logical deployment destination this target
    /// describes.
    ///
    /// The key digests endpoint, username and watch folder — never the
    /// artifact path — so that successive artifacts for one destination
    /// collide on the same key and supersede each other.
    #[must_use]
    pub fn key(&self) -> TargetKey {
        let mut digest = Sha256::new();
        digest.update(self.endpoint.as_bytes());
        digest.update(b"\n");
        digest.update(self.username.as_bytes());
        digest.update(b"\n");
        digest.update(self.folder.as_os_str().as_encoded_bytes());
        TargetKey(hex::encode(digest.finalize()))
    }
}

impl fmt::Debug for DeployTarget {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DeployTarget")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("folder", &self.folder)
            .field("pattern", &self.pattern)
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Opaque identity key over a target's deployment destination.
///
/// Used solely by the coordinator to detect "deployment already in flight
/// for this destination" when deciding what to cancel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetKey(String);

impl TargetKey {
    /// Hex digest backing this key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}
