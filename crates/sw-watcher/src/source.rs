//! Change notification sources.
//!
//! The stability engine consumes raw change notifications but does not
//! produce them. A [`ChangeSource`] hands out independent [`Subscription`]s;
//! each subscription registers one or more paths and yields a stream of
//! [`ChangeNotification`]s for them until it is closed.
//!
//! Two sources are provided:
//!
//! - [`NotifySource`]: OS notifications through the `notify` crate
//!   (inotify, FSEvents, kqueue, `ReadDirectoryChangesW`).
//! - [`ManualSource`]: an in-process source driven by [`ManualSource::emit`],
//!   for tests and for embedding where notifications arrive from elsewhere.
//!
//! # Bridging
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  notify backend thread       │
//! │  RecommendedWatcher callback │── unbounded send ──┐
//! └──────────────────────────────┘                    ▼
//!                                      ┌─────────────────────────────┐
//!                                      │ Subscription (tokio task)   │
//!                                      │ mpsc::UnboundedReceiver     │
//!                                      └─────────────────────────────┘
//! ```
//!
//! The raw channel is unbounded: the notify callback runs on the backend's
//! own thread and must never block, and a subscription that stops reading
//! is always about to be closed.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tokio::sync::mpsc;

use crate::events::{ChangeKind, ChangeNotification};

/// Produces independent notification subscriptions.
pub trait ChangeSource: Send + Sync + 'static {
    /// Opens a new subscription with no registered paths.
    fn subscribe(&self) -> Result<Subscription, notify::Error>;
}

impl<S: ChangeSource + ?Sized> ChangeSource for Arc<S> {
    fn subscribe(&self) -> Result<Subscription, notify::Error> {
        (**self).subscribe()
    }
}

/// Backend half of a [`Subscription`]: path registration and teardown.
pub trait Registration: Send + 'static {
    /// Starts delivering notifications for `path`.
    fn add(&mut self, path: &Utf8Path) -> Result<(), notify::Error>;

    /// Stops all delivery and releases backend resources.
    fn close(&mut self) -> Result<(), notify::Error>;
}

/// A stream of change notifications for the paths registered on it.
///
/// The registration is released exactly once: on [`Subscription::close`] or,
/// failing that, on drop.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<ChangeNotification>,
    registration: Option<Box<dyn Registration>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Pairs a notification receiver with the registration feeding it.
    pub fn new<R: Registration>(
        events: mpsc::UnboundedReceiver<ChangeNotification>,
        registration: R,
    ) -> Self {
        Self {
            events,
            registration: Some(Box::new(registration)),
        }
    }

    /// Registers `path` (a directory or a single file).
    pub fn add(&mut self, path: &Utf8Path) -> Result<(), notify::Error> {
        match self.registration.as_mut() {
            Some(registration) => registration.add(path),
            None => Err(notify::Error::generic("subscription is closed")),
        }
    }

    /// Receives the next notification.
    ///
    /// Returns `None` once the subscription is closed and drained, or if the
    /// backend stopped delivering.
    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        self.events.recv().await
    }

    /// Returns `true` once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.registration.is_none()
    }

    /// Releases the registration. Later calls are no-ops.
    pub fn close(&mut self) -> Result<(), notify::Error> {
        let Some(mut registration) = self.registration.take() else {
            return Ok(());
        };
        self.events.close();
        registration.close()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::debug!(error = %error, "Failed to release subscription");
        }
    }
}

// =============================================================================
// NOTIFY BACKEND
// =============================================================================

/// A [`ChangeSource`] backed by the platform's recommended `notify` watcher.
///
/// Every subscription owns its own `RecommendedWatcher`. Paths are watched
/// non-recursively.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifySource;

impl ChangeSource for NotifySource {
    fn subscribe(&self) -> Result<Subscription, notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => forward_event(&tx, &event),
                Err(error) => tracing::warn!(error = %error, "Notification backend error"),
            },
        )?;

        Ok(Subscription::new(
            rx,
            NotifyRegistration {
                watcher: Some(watcher),
            },
        ))
    }
}

/// Converts one notify event into per-path notifications.
fn forward_event(tx: &mpsc::UnboundedSender<ChangeNotification>, event: &notify::Event) {
    let kind = ChangeKind::from(&event.kind);
    // Some backends (FSEvents) do not say which side of a rename a path is.
    let ambiguous_rename = matches!(
        event.kind,
        EventKind::Modify(ModifyKind::Name(RenameMode::Any))
    );
    for path in &event.paths {
        let Ok(path) = Utf8PathBuf::try_from(path.clone()) else {
            tracing::warn!(path = %path.display(), "Skipping non-UTF-8 path in change notification");
            continue;
        };
        let kind = if ambiguous_rename && path.exists() {
            ChangeKind::Create
        } else {
            kind
        };
        if tx.send(ChangeNotification::new(path, kind)).is_err() {
            // Subscription closed; the watcher is being torn down.
            return;
        }
    }
}

struct NotifyRegistration {
    watcher: Option<RecommendedWatcher>,
}

impl Registration for NotifyRegistration {
    fn add(&mut self, path: &Utf8Path) -> Result<(), notify::Error> {
        let watcher = self
            .watcher
            .as_mut()
            .ok_or_else(|| notify::Error::generic("watcher is closed"))?;
        watcher.watch(path.as_std_path(), RecursiveMode::NonRecursive)
    }

    fn close(&mut self) -> Result<(), notify::Error> {
        // Dropping the watcher removes every watch it holds.
        self.watcher.take();
        Ok(())
    }
}

// =============================================================================
// MANUAL SOURCE
// =============================================================================

/// An in-process [`ChangeSource`] whose notifications are injected by hand.
///
/// A notification emitted for `path` reaches every live subscription that
/// registered `path` itself or its parent directory, mirroring how OS
/// backends report directory entries.
///
/// Clones share state.
///
/// # Examples
///
/// ```
/// use sw_watcher::{ChangeKind, ChangeSource, ManualSource};
/// use camino::Utf8Path;
///
/// # async fn example() -> Result<(), notify::Error> {
/// let source = ManualSource::new();
/// let mut subscription = source.subscribe()?;
/// subscription.add(Utf8Path::new("/srv/incoming"))?;
///
/// assert_eq!(source.emit("/srv/incoming/a.mp4", ChangeKind::Create), 1);
/// let notification = subscription.recv().await.unwrap();
/// assert_eq!(notification.path.as_str(), "/srv/incoming/a.mp4");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualSource {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    next_id: u64,
    subscriptions: FxHashMap<u64, ManualEntry>,
    failing_paths: FxHashSet<Utf8PathBuf>,
    refuse_subscriptions: bool,
}

#[derive(Debug)]
struct ManualEntry {
    paths: SmallVec<[Utf8PathBuf; 1]>,
    tx: mpsc::UnboundedSender<ChangeNotification>,
}

impl ManualEntry {
    fn covers(&self, path: &Utf8Path) -> bool {
        self.paths
            .iter()
            .any(|watched| watched == path || path.parent() == Some(watched.as_path()))
    }
}

impl ManualSource {
    /// Creates a source with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a notification and returns how many subscriptions received it.
    pub fn emit(&self, path: impl Into<Utf8PathBuf>, kind: ChangeKind) -> usize {
        let notification = ChangeNotification::new(path, kind);
        let state = self.state.lock();
        state
            .subscriptions
            .values()
            .filter(|entry| entry.covers(&notification.path))
            .filter(|entry| entry.tx.send(notification.clone()).is_ok())
            .count()
    }

    /// Makes every later attempt to register `path` fail.
    pub fn fail_subscriptions_for(&self, path: impl Into<Utf8PathBuf>) {
        self.state.lock().failing_paths.insert(path.into());
    }

    /// Makes [`ChangeSource::subscribe`] fail (or succeed again).
    pub fn fail_all_subscriptions(&self, refuse: bool) {
        self.state.lock().refuse_subscriptions = refuse;
    }

    /// Number of subscriptions that are still open.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Returns `true` if some open subscription has registered `path`.
    #[must_use]
    pub fn is_watched(&self, path: &Utf8Path) -> bool {
        self.state
            .lock()
            .subscriptions
            .values()
            .any(|entry| entry.paths.iter().any(|watched| watched == path))
    }
}

impl ChangeSource for ManualSource {
    fn subscribe(&self) -> Result<Subscription, notify::Error> {
        let mut state = self.state.lock();
        if state.refuse_subscriptions {
            return Err(notify::Error::generic("manual source refused subscription"));
        }

        let id = state.next_id;
        state.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        state.subscriptions.insert(
            id,
            ManualEntry {
                paths: SmallVec::new(),
                tx,
            },
        );

        Ok(Subscription::new(
            rx,
            ManualRegistration {
                id,
                state: Arc::clone(&self.state),
            },
        ))
    }
}

struct ManualRegistration {
    id: u64,
    state: Arc<Mutex<ManualState>>,
}

impl Registration for ManualRegistration {
    fn add(&mut self, path: &Utf8Path) -> Result<(), notify::Error> {
        let mut state = self.state.lock();
        if state.failing_paths.contains(path) {
            return Err(notify::Error::path_not_found().add_path(path.as_std_path().to_owned()));
        }
        let entry = state
            .subscriptions
            .get_mut(&self.id)
            .ok_or_else(|| notify::Error::generic("subscription is closed"))?;
        entry.paths.push(path.to_owned());
        Ok(())
    }

    fn close(&mut self) -> Result<(), notify::Error> {
        self.state.lock().subscriptions.remove(&self.id);
        Ok(())
    }
}
