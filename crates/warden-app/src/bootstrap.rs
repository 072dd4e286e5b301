//! Service wiring for the warden daemon.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use warden_config::{PatternRegistry, load_config};
use warden_deploy::ManagerClient;
use warden_watch::NotifyWatcher;

use crate::coordinator::Coordinator;
use crate::error::{AppError, AppResult};

/// Command-line arguments of the warden binary.
#[derive(Debug, Parser)]
#[command(
    name = "warden",
    about = "Watches build folders and hot-redeploys artifacts to Tomcat manager endpoints"
)]
pub struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,
}

/// Boot the daemon from process arguments and block until an interrupt
/// signal has been fully drained.
///
/// # Errors
///
/// Returns an error when configuration loading, watcher subscription or
/// client initialization fails; all are startup-fatal.
pub async fn run_app() -> AppResult<()> {
    let args = CliArgs::parse();
    init_logging();

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    run_app_with(&args.config, shutdown).await
}

/// Boot sequence taking an explicit configuration path and shutdown token
/// to simplify testing. Returns only after the coordinator has drained.
///
/// # Errors
///
/// Returns an error when configuration loading, watcher subscription or
/// client initialization fails.
pub async fn run_app_with(config_path: &Path, shutdown: CancellationToken) -> AppResult<()> {
    let targets = load_config(config_path).map_err(|source| AppError::Config {
        operation: "load_config",
        source,
    })?;
    let registry = PatternRegistry::new(targets).map_err(|source| AppError::Config {
        operation: "pattern_registry.new",
        source,
    })?;
    for target in registry.targets() {
        info!(
            endpoint = %target.endpoint,
            folder = %target.folder.display(),
            pattern = %target.pattern,
            app = target.app_name.as_deref().unwrap_or("<derived>"),
            "loaded deployment target"
        );
    }
    info!(targets = registry.targets().len(), "configuration loaded");

    let client = ManagerClient::new().map_err(|source| AppError::Deploy { source })?;
    let mut coordinator = Coordinator::new(
        Arc::new(registry),
        Arc::new(NotifyWatcher),
        Arc::new(client),
        shutdown,
    );
    coordinator.start()?;
    coordinator.run().await;
    info!("shutdown drain complete");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, waiting for watchers and deployments to stop"),
            Err(err) => error!(error = %err, "interrupt listener failed, shutting down"),
        }
        shutdown.cancel();
    });
}
