//! Manager client: artifact upload with cooperative cancellation.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use warden_config::DeployTarget;

use crate::error::DeployError;

/// Terminal result of one deployment attempt.
///
/// None of these is an error for the process; the coordinator logs the
/// outcome and frees the target's slot.
#[derive(Debug)]
pub enum DeployOutcome {
    /// The manager accepted the artifact (status 200 is the only success
    /// signal).
    Deployed {
        /// HTTP status returned by the manager.
        status: u16,
    },
    /// The attempt failed; the application keeps its previous version.
    Failed(DeployError),
    /// A newer artifact (or shutdown) superseded the attempt mid-flight.
    Canceled,
}

impl DeployOutcome {
    /// Short outcome discriminator for log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Deployed { .. } => "deployed",
            Self::Failed(_) => "failed",
            Self::Canceled => "canceled",
        }
    }
}

/// Upload seam between the coordinator and the manager transport.
#[async_trait]
pub trait DeployEngine: Send + Sync + 'static {
    /// Upload `artifact` to `target`, racing the manager round-trip
    /// against `cancel`. Exactly one network call, no internal retry.
    async fn deploy(
        &self,
        target: &DeployTarget,
        artifact: &Path,
        cancel: CancellationToken,
    ) -> DeployOutcome;
}

/// Production engine backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct ManagerClient {
    http: reqwest::Client,
}

impl ManagerClient {
    /// Build the shared HTTP client. The transport never proxies:
    /// deployments target management endpoints that are usually
    /// link-local.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying client cannot be initialized.
    pub fn new() -> Result<Self, DeployError> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|source| DeployError::Client { source })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl DeployEngine for ManagerClient {
    async fn deploy(
        &self,
        target: &DeployTarget,
        artifact: &Path,
        cancel: CancellationToken,
    ) -> DeployOutcome {
        let name = deploy_name(target, artifact);
        let body = match tokio::fs::read(artifact).await {
            Ok(body) => body,
            Err(source) => {
                return DeployOutcome::Failed(DeployError::Read {
                    path: artifact.to_path_buf(),
                    source,
                });
            }
        };
        let url = deploy_url(&target.endpoint, &name);
        debug!(url = %url, bytes = body.len(), "issuing deploy request");

        let request = self
            .http
            .put(url.as_str())
            .header(
                AUTHORIZATION,
                basic_auth(&target.username, &target.password),
            )
            .body(body)
            .send();
        tokio::select! {
            // Checked first so an already-superseded attempt never reaches
            // the network.
            biased;
            () = cancel.cancelled() => DeployOutcome::Canceled,
            response = request => match response {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::OK {
                        DeployOutcome::Deployed {
                            status: status.as_u16(),
                        }
                    } else {
                        DeployOutcome::Failed(DeployError::Rejected {
                            url,
                            status: status.as_u16(),
                        })
                    }
                }
                Err(source) => DeployOutcome::Failed(DeployError::Request { url, source }),
            },
        }
    }
}

/// Resolve the manager application name for an artifact: the configured
/// name when present, otherwise the artifact's basename truncated at its
/// first `.` (`shop-1.2.3.war` deploys as `shop-1`). A basename without a
/// `.` is used whole.
#[must_use]
pub fn deploy_name(target: &DeployTarget, artifact: &Path) -> String {
    if let Some(name) = target.app_name.as_deref()
        && !name.is_empty()
    {
        return name.to_string();
    }
    let basename = artifact
        .file_name()
        .unwrap_or_else(|| artifact.as_os_str())
        .to_string_lossy();
    match basename.find('.') {
        Some(end) => basename[..end].to_string(),
        None => basename.into_owned(),
    }
}

/// Encode HTTP Basic credentials into an `Authorization` header value.
#[must_use]
pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn deploy_url(endpoint: &str, name: &str) -> String {
    format!("{endpoint}/manager/text/deploy?path=/{name}&update=true")
}
