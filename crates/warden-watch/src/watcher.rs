//! Close-write subscription and first-match reporting.

use std::path::{Path, PathBuf};

use notify::event::{AccessKind, AccessMode, EventKind};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use warden_config::FolderPattern;

use crate::error::WatchError;

/// Capacity of the bridge channel between the notification callback and
/// the async match loop. On overflow the newest event is dropped; a later
/// write of the same artifact re-fires, so a dropped burst self-heals.
const EVENT_BUFFER: usize = 1024;

/// A matched artifact-creation event, consumed exactly once by the
/// coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResult {
    /// Path of the file that finished writing.
    pub artifact: PathBuf,
    /// Folder whose watcher produced the match.
    pub folder: PathBuf,
    /// Raw pattern string that matched first, in configuration order.
    pub pattern: String,
}

/// Handle on a running watcher task.
pub struct WatcherHandle {
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Wrap a spawned watcher task.
    #[must_use]
    pub const fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// Wait for the watcher task to terminate.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            warn!(error = %err, "watcher task join failed");
        }
    }
}

/// Subscription seam between the coordinator and the filesystem-event
/// capability.
pub trait ArtifactWatcher: Send + Sync + 'static {
    /// Subscribe to close-for-write events on `folder` and spawn the match
    /// loop: each event path is tested against `patterns` in order, the
    /// first match is sent on `results`, then the task exits. On
    /// `shutdown` the task exits without sending.
    ///
    /// Establishing the subscription happens before this returns, so a
    /// dead folder surfaces here rather than inside the task. Must be
    /// called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription cannot be established.
    fn subscribe(
        &self,
        folder: &Path,
        patterns: &[FolderPattern],
        results: mpsc::Sender<WatchResult>,
        shutdown: CancellationToken,
    ) -> Result<WatcherHandle, WatchError>;
}

/// Production watcher backed by `notify`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotifyWatcher;

impl ArtifactWatcher for NotifyWatcher {
    fn subscribe(
        &self,
        folder: &Path,
        patterns: &[FolderPattern],
        results: mpsc::Sender<WatchResult>,
        shutdown: CancellationToken,
    ) -> Result<WatcherHandle, WatchError> {
        let (event_tx, event_rx) = mpsc::channel::<PathBuf>(EVENT_BUFFER);
        let mut subscription = RecommendedWatcher::new(
            move |outcome: Result<Event, notify::Error>| {
                let Ok(event) = outcome else { return };
                if !is_close_write(&event.kind) {
                    return;
                }
                for path in event.paths {
                    if let Err(TrySendError::Full(path)) = event_tx.try_send(path) {
                        debug!(
                            path = %path.display(),
                            "event buffer full, dropping close-write event"
                        );
                    }
                }
            },
            Config::default(),
        )
        .map_err(|source| WatchError::Subscribe {
            folder: folder.to_path_buf(),
            source,
        })?;
        subscription
            .watch(folder, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Subscribe {
                folder: folder.to_path_buf(),
                source,
            })?;

        let task = tokio::spawn(match_loop(
            subscription,
            folder.to_path_buf(),
            patterns.to_vec(),
            event_rx,
            results,
            shutdown,
        ));
        Ok(WatcherHandle::new(task))
    }
}

async fn match_loop(
    subscription: RecommendedWatcher,
    folder: PathBuf,
    patterns: Vec<FolderPattern>,
    mut events: mpsc::Receiver<PathBuf>,
    results: mpsc::Sender<WatchResult>,
    shutdown: CancellationToken,
) {
    // The subscription must outlive the loop; dropping it unsubscribes.
    let _subscription = subscription;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            event = events.recv() => {
                let Some(path) = event else { return };
                let Some(pattern) = first_match(&patterns, &path) else {
                    continue;
                };
                debug!(
                    artifact = %path.display(),
                    pattern = %pattern,
                    "artifact detected"
                );
                let result = WatchResult {
                    artifact: path,
                    folder,
                    pattern,
                };
                tokio::select! {
                    () = shutdown.cancelled() => {}
                    _ = results.send(result) => {}
                }
                return;
            }
        }
    }
}

fn first_match(patterns: &[FolderPattern], path: &Path) -> Option<String> {
    let text = path.to_string_lossy();
    patterns
        .iter()
        .find(|pattern| pattern.is_match(&text))
        .map(|pattern| pattern.raw().to_string())
}

const fn is_close_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}
