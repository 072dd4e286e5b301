//! Deploy coordination: one event loop owning all mutable state.
//!
//! The coordinator consumes watch results, cancels a superseded upload
//! before launching its replacement, respawns the single-shot folder
//! watchers, and on shutdown drains every watcher and deployment before
//! returning. All tables have exactly one owner (this loop), so no locks
//! are involved.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warden_config::{PatternRegistry, TargetKey};
use warden_deploy::{DeployEngine, DeployOutcome};
use warden_watch::{ArtifactWatcher, WatchResult, WatcherHandle};

use crate::error::{AppError, AppResult};

/// Capacity of the shared watcher-to-coordinator result channel. Watchers
/// block on send until the coordinator accepts, so this only smooths
/// simultaneous matches across folders.
const RESULT_BUFFER: usize = 16;

/// Coordinator-owned record of one live deployment task.
///
/// At most one exists per target key at any instant; that is the central
/// correctness property of the loop.
struct InFlightDeployment {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Message sent by a deployment task the moment it terminates, whatever
/// the outcome.
struct DeployFinished {
    key: TargetKey,
    id: Uuid,
}

/// Single-threaded control loop wiring watchers to deployments.
pub struct Coordinator<W, D> {
    registry: Arc<PatternRegistry>,
    watcher: Arc<W>,
    engine: Arc<D>,
    shutdown: CancellationToken,
    results_tx: mpsc::Sender<WatchResult>,
    results_rx: mpsc::Receiver<WatchResult>,
    finished_tx: mpsc::UnboundedSender<DeployFinished>,
    finished_rx: mpsc::UnboundedReceiver<DeployFinished>,
    in_flight: HashMap<TargetKey, InFlightDeployment>,
    folder_watchers: HashMap<PathBuf, WatcherHandle>,
}

impl<W, D> Coordinator<W, D>
where
    W: ArtifactWatcher,
    D: DeployEngine,
{
    /// Build a coordinator over a fixed registry. `shutdown` is the
    /// process-wide stop signal; cancelling it makes [`Self::run`] drain
    /// and return.
    #[must_use]
    pub fn new(
        registry: Arc<PatternRegistry>,
        watcher: Arc<W>,
        engine: Arc<D>,
        shutdown: CancellationToken,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::channel(RESULT_BUFFER);
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            watcher,
            engine,
            shutdown,
            results_tx,
            results_rx,
            finished_tx,
            finished_rx,
            in_flight: HashMap::new(),
            folder_watchers: HashMap::new(),
        }
    }

    /// Sender feeding the coordinator's result loop. Every watcher holds a
    /// clone.
    #[must_use]
    pub fn results_sender(&self) -> mpsc::Sender<WatchResult> {
        self.results_tx.clone()
    }

    /// Launch one watcher per configured folder.
    ///
    /// # Errors
    ///
    /// Returns an error when any subscription cannot be established;
    /// startup must abort before the event loop runs.
    pub fn start(&mut self) -> AppResult<()> {
        for (folder, patterns) in self.registry.folders() {
            let handle = self
                .watcher
                .subscribe(
                    folder,
                    patterns,
                    self.results_tx.clone(),
                    self.shutdown.clone(),
                )
                .map_err(|source| AppError::Watch { source })?;
            self.folder_watchers.insert(folder.to_path_buf(), handle);
            info!(
                folder = %folder.display(),
                patterns = patterns.len(),
                "watching folder"
            );
        }
        Ok(())
    }

    /// Run until the shutdown token fires, then drain every watcher and
    /// in-flight deployment. Returning is the shutdown acknowledgment.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                Some(result) = self.results_rx.recv() => self.handle_result(result).await,
                Some(finished) = self.finished_rx.recv() => self.handle_finished(&finished),
            }
        }
        self.drain().await;
    }

    async fn handle_result(&mut self, result: WatchResult) {
        // The reporting watcher is done; put its replacement in place
        // before anything slow happens.
        self.rewatch_folder(&result.folder).await;

        let Some(target) = self.registry.target_for(&result.folder, &result.pattern).cloned()
        else {
            warn!(
                artifact = %result.artifact.display(),
                pattern = %result.pattern,
                "no target registered for matched pattern, dropping event"
            );
            return;
        };
        let key = target.key();

        if let Some(previous) = self.in_flight.remove(&key) {
            info!(key = %key, "superseding in-flight deployment");
            previous.cancel.cancel();
            // The slot is not free until the superseded task has fully
            // terminated and released its connection.
            if let Err(err) = previous.task.await {
                warn!(error = %err, "superseded deployment task join failed");
            }
        }

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let task = {
            let engine = Arc::clone(&self.engine);
            let finished = self.finished_tx.clone();
            let cancel = cancel.clone();
            let key = key.clone();
            let artifact = result.artifact;
            tokio::spawn(async move {
                info!(
                    artifact = %artifact.display(),
                    endpoint = %target.endpoint,
                    "deployment started"
                );
                let outcome = engine.deploy(&target, &artifact, cancel).await;
                match &outcome {
                    DeployOutcome::Deployed { status } => info!(
                        artifact = %artifact.display(),
                        status = *status,
                        "deployment complete"
                    ),
                    DeployOutcome::Failed(source) => warn!(
                        artifact = %artifact.display(),
                        error = %source,
                        "deployment failed"
                    ),
                    DeployOutcome::Canceled => info!(
                        artifact = %artifact.display(),
                        "deployment canceled"
                    ),
                }
                let _ = finished.send(DeployFinished { key, id });
            })
        };
        self.in_flight.insert(key, InFlightDeployment { id, cancel, task });
    }

    fn handle_finished(&mut self, finished: &DeployFinished) {
        // A superseded task's late message must not evict its successor.
        let current = self
            .in_flight
            .get(&finished.key)
            .is_some_and(|in_flight| in_flight.id == finished.id);
        if current {
            self.in_flight.remove(&finished.key);
            debug!(key = %finished.key, "deployment slot freed");
        }
    }

    async fn rewatch_folder(&mut self, folder: &Path) {
        if let Some(previous) = self.folder_watchers.remove(folder) {
            // The watcher has already sent its single result, so this join
            // completes as soon as it returns.
            previous.join().await;
        }
        let patterns = self.registry.patterns_for_folder(folder);
        if patterns.is_empty() {
            warn!(folder = %folder.display(), "matched folder is not configured, not re-watching");
            return;
        }
        match self.watcher.subscribe(
            folder,
            patterns,
            self.results_tx.clone(),
            self.shutdown.clone(),
        ) {
            Ok(handle) => {
                self.folder_watchers.insert(folder.to_path_buf(), handle);
            }
            Err(source) => error!(
                folder = %folder.display(),
                error = %source,
                "failed to re-subscribe folder watcher"
            ),
        }
    }

    async fn drain(&mut self) {
        info!(
            watchers = self.folder_watchers.len(),
            deployments = self.in_flight.len(),
            "shutdown requested, draining"
        );
        for (folder, handle) in self.folder_watchers.drain() {
            handle.join().await;
            debug!(folder = %folder.display(), "watcher stopped");
        }
        for (key, in_flight) in self.in_flight.drain() {
            in_flight.cancel.cancel();
            if let Err(err) = in_flight.task.await {
                warn!(error = %err, "deployment task join failed during drain");
            }
            debug!(key = %key, "deployment drained");
        }
        info!("drain complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio::time::{sleep, timeout};
    use warden_config::DeployTarget;
    use warden_watch::WatchError;

    struct StubEngine {
        events: Mutex<Vec<String>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        release: Notify,
    }

    impl StubEngine {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                release: Notify::new(),
            })
        }

        fn record(&self, event: String) {
            self.events.lock().expect("events lock").push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().expect("events lock").clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.events()
                .iter()
                .filter(|event| event.starts_with(prefix))
                .count()
        }
    }

    #[async_trait]
    impl DeployEngine for StubEngine {
        async fn deploy(
            &self,
            _target: &DeployTarget,
            artifact: &Path,
            cancel: CancellationToken,
        ) -> DeployOutcome {
            let name = artifact
                .file_name()
                .expect("artifact basename")
                .to_string_lossy()
                .into_owned();
            self.record(format!("start:{name}"));
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.record(format!("canceled:{name}"));
                    DeployOutcome::Canceled
                }
                () = self.release.notified() => {
                    self.record(format!("deployed:{name}"));
                    DeployOutcome::Deployed { status: 200 }
                }
            };
            self.active.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    struct StubWatcher {
        linger: bool,
        subscriptions: Mutex<Vec<(PathBuf, Vec<String>)>>,
        completed: Arc<AtomicUsize>,
    }

    impl StubWatcher {
        fn new(linger: bool) -> Arc<Self> {
            Arc::new(Self {
                linger,
                subscriptions: Mutex::new(Vec::new()),
                completed: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn subscriptions(&self) -> Vec<(PathBuf, Vec<String>)> {
            self.subscriptions.lock().expect("subscriptions lock").clone()
        }
    }

    impl ArtifactWatcher for StubWatcher {
        fn subscribe(
            &self,
            folder: &Path,
            patterns: &[warden_config::FolderPattern],
            _results: mpsc::Sender<WatchResult>,
            shutdown: CancellationToken,
        ) -> Result<WatcherHandle, WatchError> {
            self.subscriptions.lock().expect("subscriptions lock").push((
                folder.to_path_buf(),
                patterns
                    .iter()
                    .map(|pattern| pattern.raw().to_string())
                    .collect(),
            ));
            let linger = self.linger;
            let completed = Arc::clone(&self.completed);
            let task = tokio::spawn(async move {
                if linger {
                    shutdown.cancelled().await;
                }
                completed.fetch_add(1, Ordering::SeqCst);
            });
            Ok(WatcherHandle::new(task))
        }
    }

    fn target(folder: &str, pattern: &str, endpoint: &str) -> DeployTarget {
        DeployTarget {
            endpoint: endpoint.to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            folder: PathBuf::from(folder),
            pattern: pattern.to_string(),
            app_name: None,
        }
    }

    fn result(folder: &str, artifact: &str, pattern: &str) -> WatchResult {
        WatchResult {
            artifact: PathBuf::from(folder).join(artifact),
            folder: PathBuf::from(folder),
            pattern: pattern.to_string(),
        }
    }

    struct Harness {
        results: mpsc::Sender<WatchResult>,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    }

    impl Harness {
        async fn stop(self) {
            self.shutdown.cancel();
            timeout(Duration::from_secs(5), self.task)
                .await
                .expect("coordinator should drain in time")
                .expect("coordinator task should not panic");
        }
    }

    fn spawn_coordinator(
        targets: Vec<DeployTarget>,
        watcher: &Arc<StubWatcher>,
        engine: &Arc<StubEngine>,
    ) -> Harness {
        let registry = Arc::new(PatternRegistry::new(targets).expect("registry should build"));
        let shutdown = CancellationToken::new();
        let mut coordinator = Coordinator::new(
            registry,
            Arc::clone(watcher),
            Arc::clone(engine),
            shutdown.clone(),
        );
        coordinator.start().expect("start should subscribe watchers");
        let results = coordinator.results_sender();
        let task = tokio::spawn(coordinator.run());
        Harness {
            results,
            shutdown,
            task,
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    #[tokio::test]
    async fn deploys_matching_artifact() {
        let watcher = StubWatcher::new(false);
        let engine = StubEngine::new();
        let harness = spawn_coordinator(
            vec![target("/deploy", r".*\.war$", "http://a:8080")],
            &watcher,
            &engine,
        );

        harness
            .results
            .send(result("/deploy", "shop.war", r".*\.war$"))
            .await
            .expect("result should be accepted");

        wait_until(|| engine.count("start:shop.war") == 1).await;
        engine.release.notify_one();
        wait_until(|| engine.count("deployed:shop.war") == 1).await;

        harness.stop().await;
    }

    #[tokio::test]
    async fn newer_artifact_supersedes_in_flight_deployment() {
        let watcher = StubWatcher::new(false);
        let engine = StubEngine::new();
        let harness = spawn_coordinator(
            vec![target("/deploy", r".*\.war$", "http://a:8080")],
            &watcher,
            &engine,
        );

        harness
            .results
            .send(result("/deploy", "a.war", r".*\.war$"))
            .await
            .expect("result should be accepted");
        wait_until(|| engine.count("start:a.war") == 1).await;

        harness
            .results
            .send(result("/deploy", "b.war", r".*\.war$"))
            .await
            .expect("result should be accepted");
        wait_until(|| engine.count("start:b.war") == 1).await;

        // The superseded upload observed cancellation before its
        // replacement started.
        let events = engine.events();
        assert_eq!(
            events,
            vec!["start:a.war", "canceled:a.war", "start:b.war"]
        );
        assert_eq!(engine.max_active.load(Ordering::SeqCst), 1);

        engine.release.notify_one();
        wait_until(|| engine.count("deployed:b.war") == 1).await;
        harness.stop().await;
    }

    #[tokio::test]
    async fn burst_keeps_at_most_one_deployment_in_flight() {
        let watcher = StubWatcher::new(false);
        let engine = StubEngine::new();
        let harness = spawn_coordinator(
            vec![target("/deploy", r".*\.war$", "http://a:8080")],
            &watcher,
            &engine,
        );

        for build in 0..10 {
            harness
                .results
                .send(result("/deploy", &format!("app-{build}.war"), r".*\.war$"))
                .await
                .expect("result should be accepted");
        }
        wait_until(|| engine.count("start:") == 10).await;

        engine.release.notify_one();
        wait_until(|| engine.count("deployed:") == 1).await;

        assert_eq!(engine.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(engine.count("canceled:"), 9);
        assert_eq!(engine.count("deployed:app-9.war"), 1);
        harness.stop().await;
    }

    #[tokio::test]
    async fn independent_targets_deploy_concurrently() {
        let watcher = StubWatcher::new(false);
        let engine = StubEngine::new();
        let harness = spawn_coordinator(
            vec![
                target("/deploy", r".*\.war$", "http://a:8080"),
                target("/staging", r".*\.war$", "http://b:8080"),
            ],
            &watcher,
            &engine,
        );

        harness
            .results
            .send(result("/deploy", "front.war", r".*\.war$"))
            .await
            .expect("result should be accepted");
        harness
            .results
            .send(result("/staging", "back.war", r".*\.war$"))
            .await
            .expect("result should be accepted");

        wait_until(|| engine.count("start:") == 2).await;
        assert_eq!(engine.max_active.load(Ordering::SeqCst), 2);
        assert_eq!(engine.count("canceled:"), 0);

        harness.stop().await;
        assert_eq!(engine.count("canceled:"), 2);
    }

    #[tokio::test]
    async fn shutdown_drains_in_flight_deployments() {
        let watcher = StubWatcher::new(false);
        let engine = StubEngine::new();
        let harness = spawn_coordinator(
            vec![
                target("/deploy", r".*\.war$", "http://a:8080"),
                target("/staging", r".*\.war$", "http://b:8080"),
                target("/hotfix", r".*\.war$", "http://c:8080"),
            ],
            &watcher,
            &engine,
        );

        for folder in ["/deploy", "/staging", "/hotfix"] {
            harness
                .results
                .send(result(folder, "app.war", r".*\.war$"))
                .await
                .expect("result should be accepted");
        }
        wait_until(|| engine.count("start:") == 3).await;

        harness.stop().await;

        // run() only returned after every upload observed cancellation and
        // terminated.
        assert_eq!(engine.count("canceled:"), 3);
        assert_eq!(engine.active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shutdown_waits_for_folder_watchers() {
        let watcher = StubWatcher::new(true);
        let engine = StubEngine::new();
        let harness = spawn_coordinator(
            vec![
                target("/deploy", r".*\.war$", "http://a:8080"),
                target("/staging", r".*\.war$", "http://b:8080"),
            ],
            &watcher,
            &engine,
        );

        assert_eq!(watcher.subscriptions().len(), 2);
        harness.stop().await;
        assert_eq!(watcher.completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn match_respawns_folder_watcher_with_full_pattern_set() {
        let watcher = StubWatcher::new(false);
        let engine = StubEngine::new();
        let harness = spawn_coordinator(
            vec![
                target("/deploy", r"frontend-.*\.war$", "http://a:8080"),
                target("/deploy", r"backend-.*\.war$", "http://b:8080"),
            ],
            &watcher,
            &engine,
        );

        harness
            .results
            .send(result("/deploy", "backend-1.war", r"backend-.*\.war$"))
            .await
            .expect("result should be accepted");

        wait_until(|| watcher.subscriptions().len() == 2).await;
        let subscriptions = watcher.subscriptions();
        assert_eq!(subscriptions[1].0, PathBuf::from("/deploy"));
        assert_eq!(
            subscriptions[1].1,
            vec![r"frontend-.*\.war$", r"backend-.*\.war$"]
        );

        harness.stop().await;
    }

    #[tokio::test]
    async fn unresolved_pattern_is_dropped_not_fatal() {
        let watcher = StubWatcher::new(false);
        let engine = StubEngine::new();
        let harness = spawn_coordinator(
            vec![target("/deploy", r".*\.war$", "http://a:8080")],
            &watcher,
            &engine,
        );

        harness
            .results
            .send(result("/deploy", "stray.jar", r".*\.jar$"))
            .await
            .expect("result should be accepted");
        wait_until(|| watcher.subscriptions().len() == 2).await;
        assert_eq!(engine.count("start:"), 0);

        // The loop is still alive and the folder is still watched.
        harness
            .results
            .send(result("/deploy", "shop.war", r".*\.war$"))
            .await
            .expect("result should be accepted");
        wait_until(|| engine.count("start:shop.war") == 1).await;

        harness.stop().await;
    }

    #[tokio::test]
    async fn completed_deployment_frees_slot_without_cancel() {
        let watcher = StubWatcher::new(false);
        let engine = StubEngine::new();
        let harness = spawn_coordinator(
            vec![target("/deploy", r".*\.war$", "http://a:8080")],
            &watcher,
            &engine,
        );

        harness
            .results
            .send(result("/deploy", "a.war", r".*\.war$"))
            .await
            .expect("result should be accepted");
        wait_until(|| engine.count("start:a.war") == 1).await;
        engine.release.notify_one();
        wait_until(|| engine.count("deployed:a.war") == 1).await;

        harness
            .results
            .send(result("/deploy", "b.war", r".*\.war$"))
            .await
            .expect("result should be accepted");
        wait_until(|| engine.count("start:b.war") == 1).await;

        // The finished upload was not "superseded"; only live uploads get
        // canceled.
        assert_eq!(engine.count("canceled:"), 0);

        engine.release.notify_one();
        wait_until(|| engine.count("deployed:b.war") == 1).await;
        harness.stop().await;
    }

    #[tokio::test]
    async fn stale_completion_does_not_evict_successor() {
        let watcher = StubWatcher::new(false);
        let engine = StubEngine::new();
        let registry = Arc::new(
            PatternRegistry::new(vec![target("/deploy", r".*\.war$", "http://a:8080")])
                .expect("registry should build"),
        );
        let shutdown = CancellationToken::new();
        let mut coordinator =
            Coordinator::new(registry, watcher, engine, shutdown);
        coordinator.start().expect("start should subscribe watchers");

        coordinator
            .handle_result(result("/deploy", "a.war", r".*\.war$"))
            .await;
        let key = target("/deploy", r".*\.war$", "http://a:8080").key();
        let first = coordinator.in_flight.get(&key).expect("first in flight").id;

        coordinator
            .handle_result(result("/deploy", "b.war", r".*\.war$"))
            .await;
        let second = coordinator.in_flight.get(&key).expect("second in flight").id;
        assert_ne!(first, second);

        // The superseded task's completion message arrives late; the
        // successor's slot must survive it.
        coordinator.handle_finished(&DeployFinished { key: key.clone(), id: first });
        assert!(coordinator.in_flight.contains_key(&key));

        coordinator.handle_finished(&DeployFinished { key: key.clone(), id: second });
        assert!(!coordinator.in_flight.contains_key(&key));

        coordinator.shutdown.cancel();
        coordinator.drain().await;
    }
}
