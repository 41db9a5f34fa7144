//! The stable file watcher handle.
//!
//! [`StableFileWatcher`] wires a [`ChangeSource`] to the directory monitor and
//! the per-file trackers, and exposes the resulting stream of
//! [`StabilityEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    Async Runtime (tokio)                         │
//! │                                                                  │
//! │  DirectoryMonitor ── create ──► FileStabilityTracker (per file)  │
//! │        │                                 │                       │
//! │        │ CancellationToken (shared)      │ mpsc::Sender          │
//! │        ▼                                 ▼                       │
//! │  StableFileWatcher ◄──────── mpsc::Receiver<StabilityEvent>      │
//! │  (close / shutdown)                                              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use sw_watcher::StableFileWatcher;
//! use camino::Utf8Path;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut watcher =
//!         StableFileWatcher::new(Utf8Path::new("/srv/incoming"), Duration::from_secs(5)).await?;
//!
//!     while let Some(event) = watcher.recv().await {
//!         println!("ready: {}", event.path);
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use sw_core::WatchConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::WatchError;
use crate::events::StabilityEvent;
use crate::filter::{AcceptAllFilter, FileFilter};
use crate::monitor::{DirectoryMonitor, list_candidates};
use crate::source::{ChangeSource, NotifySource};
use crate::tracker::TrackerContext;

/// Watches one directory and reports files once they stop changing.
///
/// # Lifecycle
///
/// 1. **Creation**: validates the directory, opens the directory
///    subscription, lists existing files, registers the directory and
///    starts the monitor task. Any failure here is returned and nothing
///    keeps running.
///
/// 2. **Event Reception**: [`recv`](Self::recv) yields one
///    [`StabilityEvent`] per file that went quiet for the threshold and
///    still exists. Events for different files arrive in no particular
///    order.
///
/// 3. **Shutdown**: [`close`](Self::close) fires the shared cancellation
///    signal without waiting; [`shutdown`](Self::shutdown) also waits for the
///    monitor and every tracker. Dropping the watcher closes it. After
///    cancellation no event is sent and `recv` returns `None` once the
///    remaining tasks have unwound.
///
/// # Examples
///
/// ```no_run
/// use sw_watcher::{ExtensionFilter, StableFileWatcher};
/// use sw_core::WatchConfig;
/// use camino::Utf8Path;
///
/// # async fn example() -> Result<(), sw_watcher::WatchError> {
/// let config = WatchConfig::default();
/// let mut watcher = StableFileWatcher::from_config(
///     Utf8Path::new("/srv/incoming"),
///     &config,
///     ExtensionFilter::new(&["mp4"]),
/// )
/// .await?;
///
/// if let Some(event) = watcher.recv().await {
///     println!("transcode {}", event.path);
/// }
/// watcher.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct StableFileWatcher {
    /// Shared shutdown signal observed by the monitor and all trackers.
    cancel: CancellationToken,

    /// Handle to the directory monitor task.
    ///
    /// Taken by [`shutdown`](Self::shutdown).
    monitor: Option<JoinHandle<()>>,

    /// Tracker tasks, counted so shutdown can wait for them.
    trackers: TaskTracker,

    /// Stability events for async consumption.
    event_rx: mpsc::Receiver<StabilityEvent>,

    /// The canonicalized directory being watched.
    watch_dir: Utf8PathBuf,

    /// Quiet period before a file is reported.
    threshold: Duration,
}

impl std::fmt::Debug for StableFileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StableFileWatcher")
            .field("watch_dir", &self.watch_dir)
            .field("threshold", &self.threshold)
            .field("is_running", &self.is_running())
            .field("active_trackers", &self.active_trackers())
            .finish_non_exhaustive()
    }
}

impl StableFileWatcher {
    /// Watches `dir` with OS notifications, tracking every file.
    ///
    /// # Errors
    ///
    /// See [`with_source`](Self::with_source).
    pub async fn new(dir: &Utf8Path, threshold: Duration) -> Result<Self, WatchError> {
        Self::with_source(
            NotifySource,
            dir,
            &WatchConfig::with_threshold(threshold),
            AcceptAllFilter,
        )
        .await
    }

    /// Watches `dir` with OS notifications using `config` and `filter`.
    ///
    /// # Errors
    ///
    /// See [`with_source`](Self::with_source).
    pub async fn from_config<F: FileFilter>(
        dir: &Utf8Path,
        config: &WatchConfig,
        filter: F,
    ) -> Result<Self, WatchError> {
        Self::with_source(NotifySource, dir, config, filter).await
    }

    /// Watches `dir` with notifications from `source`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`WatchError::Config`] if `config` fails validation
    /// - [`WatchError::PathNotFound`] / [`WatchError::NotADirectory`] if `dir`
    ///   is not an existing directory
    /// - [`WatchError::CreateSource`] if the directory subscription cannot be
    ///   opened
    /// - [`WatchError::ListDirectory`] if the initial listing fails
    /// - [`WatchError::RegisterDirectory`] if `dir` cannot be watched
    #[allow(clippy::unused_async)] // Async so construction always happens inside a runtime
    pub async fn with_source<S: ChangeSource, F: FileFilter>(
        source: S,
        dir: &Utf8Path,
        config: &WatchConfig,
        filter: F,
    ) -> Result<Self, WatchError> {
        config.validate()?;

        if !dir.exists() {
            return Err(WatchError::path_not_found(dir));
        }
        if !dir.is_dir() {
            return Err(WatchError::NotADirectory(dir.to_owned()));
        }
        let watch_dir = dir.canonicalize_utf8()?;
        let threshold = config.stable_threshold();

        let mut subscription = source.subscribe().map_err(WatchError::CreateSource)?;
        let preexisting = list_candidates(&watch_dir, &filter)?;
        subscription
            .add(&watch_dir)
            .map_err(|source| WatchError::RegisterDirectory {
                path: watch_dir.clone(),
                source,
            })?;

        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let cancel = CancellationToken::new();
        let trackers = TaskTracker::new();

        let context = TrackerContext {
            source: Arc::new(source),
            threshold,
            cancel: cancel.clone(),
            sink: event_tx,
        };
        let monitor = DirectoryMonitor::new(
            watch_dir.clone(),
            subscription,
            filter,
            context,
            trackers.clone(),
        );

        tracing::info!(
            dir = %watch_dir,
            threshold_ms = threshold.as_millis(),
            existing_files = preexisting.len(),
            "Stable file watcher started"
        );
        let monitor = tokio::spawn(monitor.run(preexisting));

        Ok(Self {
            cancel,
            monitor: Some(monitor),
            trackers,
            event_rx,
            watch_dir,
            threshold,
        })
    }

    /// Receives the next stability event.
    ///
    /// Returns `None` once the watcher has been closed and every task has
    /// finished.
    pub async fn recv(&mut self) -> Option<StabilityEvent> {
        self.event_rx.recv().await
    }

    /// Tries to receive a stability event without waiting.
    pub fn try_recv(&mut self) -> Result<StabilityEvent, mpsc::error::TryRecvError> {
        self.event_rx.try_recv()
    }

    /// Returns a mutable reference to the event receiver, for use with
    /// `tokio::select!` or stream adapters.
    pub fn events(&mut self) -> &mut mpsc::Receiver<StabilityEvent> {
        &mut self.event_rx
    }

    /// Returns the canonicalized directory being watched.
    #[must_use]
    pub fn watch_dir(&self) -> &Utf8Path {
        &self.watch_dir
    }

    /// Returns the stability threshold.
    #[must_use]
    pub const fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Returns `true` until the watcher is closed or its monitor stops.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.monitor.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Number of files currently being tracked.
    #[must_use]
    pub fn active_trackers(&self) -> usize {
        self.trackers.len()
    }

    /// Returns a handle that can close this watcher from another task.
    #[must_use]
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Signals every task to stop. Idempotent and non-blocking.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(dir = %self.watch_dir, "Closing stable file watcher");
        }
        self.cancel.cancel();
    }

    /// Closes the watcher and waits for the monitor and all trackers to end.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::MonitorFailed`] if the monitor task panicked.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        self.close();
        self.trackers.close();

        if let Some(handle) = self.monitor.take() {
            handle.await.map_err(WatchError::MonitorFailed)?;
        }
        self.trackers.wait().await;

        tracing::info!(dir = %self.watch_dir, "Stable file watcher stopped");
        Ok(())
    }
}

impl Drop for StableFileWatcher {
    fn drop(&mut self) {
        // Tasks observe the token and unwind on their own.
        self.cancel.cancel();
    }
}

/// Closes a [`StableFileWatcher`] from anywhere.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    cancel: CancellationToken,
}

impl CloseHandle {
    /// Signals the watcher to stop. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the watcher has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ManualSource;
    use tempfile::TempDir;

    fn create_temp_dir() -> TempDir {
        TempDir::new().expect("Failed to create temp directory")
    }

    async fn manual_watcher(temp_dir: &TempDir) -> (StableFileWatcher, ManualSource) {
        let source = ManualSource::new();
        let path = Utf8Path::from_path(temp_dir.path()).expect("Invalid path");
        let watcher = StableFileWatcher::with_source(
            source.clone(),
            path,
            &WatchConfig::default(),
            AcceptAllFilter,
        )
        .await
        .expect("Failed to create watcher");
        (watcher, source)
    }

    #[tokio::test]
    async fn test_watcher_creation() {
        let temp_dir = create_temp_dir();
        let (watcher, source) = manual_watcher(&temp_dir).await;

        assert!(watcher.is_running());
        assert_eq!(watcher.threshold(), Duration::from_millis(500));
        assert!(source.is_watched(watcher.watch_dir()));
    }

    #[tokio::test]
    async fn test_watcher_path_not_found() {
        let path = Utf8Path::new("/nonexistent/path/that/does/not/exist");
        let result = StableFileWatcher::new(path, Duration::from_millis(100)).await;

        match result {
            Err(WatchError::PathNotFound(_)) => {}
            other => panic!("Expected PathNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_watcher_rejects_file_path() {
        let temp_dir = create_temp_dir();
        let file = temp_dir.path().join("a.mp4");
        std::fs::write(&file, b"x").expect("Failed to write file");
        let file = Utf8Path::from_path(&file).expect("Invalid path");

        let result = StableFileWatcher::new(file, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(WatchError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn test_watcher_rejects_invalid_config() {
        let temp_dir = create_temp_dir();
        let path = Utf8Path::from_path(temp_dir.path()).expect("Invalid path");

        let result = StableFileWatcher::new(path, Duration::ZERO).await;
        assert!(matches!(result, Err(WatchError::Config(_))));
    }

    #[tokio::test]
    async fn test_watcher_source_failure_is_fatal() {
        let temp_dir = create_temp_dir();
        let source = ManualSource::new();
        source.fail_all_subscriptions(true);
        let path = Utf8Path::from_path(temp_dir.path()).expect("Invalid path");

        let result =
            StableFileWatcher::with_source(source, path, &WatchConfig::default(), AcceptAllFilter)
                .await;
        assert!(matches!(result, Err(WatchError::CreateSource(_))));
    }

    #[tokio::test]
    async fn test_watcher_register_failure_is_fatal() {
        let temp_dir = create_temp_dir();
        let source = ManualSource::new();
        let path = Utf8Path::from_path(temp_dir.path()).expect("Invalid path");
        source.fail_subscriptions_for(path.canonicalize_utf8().expect("Failed to canonicalize"));

        let result = StableFileWatcher::with_source(
            source.clone(),
            path,
            &WatchConfig::default(),
            AcceptAllFilter,
        )
        .await;

        assert!(matches!(result, Err(WatchError::RegisterDirectory { .. })));
        assert_eq!(source.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_watcher_shutdown() {
        let temp_dir = create_temp_dir();
        let (watcher, source) = manual_watcher(&temp_dir).await;

        watcher.shutdown().await.expect("Shutdown failed");
        assert_eq!(source.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_event_stream() {
        let temp_dir = create_temp_dir();
        let (mut watcher, _source) = manual_watcher(&temp_dir).await;

        watcher.close();
        watcher.close();
        assert!(!watcher.is_running());

        let end = tokio::time::timeout(Duration::from_secs(2), watcher.recv()).await;
        assert!(matches!(end, Ok(None)));
    }

    #[tokio::test]
    async fn test_close_handle() {
        let temp_dir = create_temp_dir();
        let (mut watcher, _source) = manual_watcher(&temp_dir).await;
        let handle = watcher.close_handle();

        tokio::spawn(async move { handle.close() });

        let end = tokio::time::timeout(Duration::from_secs(2), watcher.recv()).await;
        assert!(matches!(end, Ok(None)));
    }

    #[tokio::test]
    async fn test_notify_watcher_reports_stable_file() {
        let temp_dir = create_temp_dir();
        let path = Utf8Path::from_path(temp_dir.path()).expect("Invalid path");
        let mut watcher = StableFileWatcher::new(path, Duration::from_millis(100))
            .await
            .expect("Failed to create watcher");

        std::fs::write(temp_dir.path().join("clip.mp4"), b"frames").expect("Failed to write file");

        let event = tokio::time::timeout(Duration::from_secs(5), watcher.recv())
            .await
            .expect("Timed out waiting for stability event")
            .expect("Event stream ended");
        assert_eq!(event.file_name(), Some("clip.mp4"));

        watcher.shutdown().await.expect("Shutdown failed");
    }
}
