//! Event types flowing into and out of the stability engine.
//!
//! # Event Flow
//!
//! ```text
//! notification source
//!        │  ChangeNotification { path, kind }
//!        ▼
//! DirectoryMonitor ── Create ──► spawn tracker
//!                                    │  ChangeNotification (path-scoped)
//!                                    ▼
//!                            FileStabilityTracker
//!                                    │  quiet for `threshold`, file present
//!                                    ▼
//!                        StabilityEvent { path } ──► consumer
//! ```

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{ModifyKind, RenameMode};
use notify::EventKind;
use serde::Serialize;
use tokio::time::Instant;

/// The kind of raw change reported by a notification source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A file or directory was created.
    Create,
    /// File contents or metadata changed.
    Write,
    /// The path was removed.
    Remove,
    /// The path was renamed or moved away.
    ///
    /// The arriving side of a move reports [`ChangeKind::Create`] instead.
    Rename,
    /// Any other notification (access, unknown backend events).
    Other,
}

impl ChangeKind {
    /// Returns `true` for [`ChangeKind::Create`].
    #[inline]
    #[must_use]
    pub const fn is_create(self) -> bool {
        matches!(self, Self::Create)
    }
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            // A file moved in is a new arrival, like one written in place.
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                Self::Create
            }
            EventKind::Modify(ModifyKind::Name(_)) => Self::Rename,
            EventKind::Modify(_) => Self::Write,
            EventKind::Remove(_) => Self::Remove,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Self::Other,
        }
    }
}

/// A single raw change notification for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// The path the change applies to.
    pub path: Utf8PathBuf,
    /// What happened to it.
    pub kind: ChangeKind,
}

impl ChangeNotification {
    /// Creates a notification.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Signals that a file has stopped changing and is ready to be processed.
///
/// Only `path` is part of the serialized form. The timestamps come from the
/// tokio clock, so they follow a paused test clock as well.
///
/// # Examples
///
/// ```
/// use sw_watcher::StabilityEvent;
/// use camino::Utf8PathBuf;
/// use tokio::time::Instant;
///
/// let discovered = Instant::now();
/// let event = StabilityEvent::new(Utf8PathBuf::from("/srv/incoming/a.mp4"), discovered);
/// assert_eq!(event.file_name(), Some("a.mp4"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StabilityEvent {
    /// Path of the stable file, inside the watched directory.
    pub path: Utf8PathBuf,

    /// When the file was first discovered by the watcher.
    #[serde(skip)]
    pub discovered_at: Instant,

    /// When the quiet period elapsed.
    #[serde(skip)]
    pub stable_at: Instant,
}

impl StabilityEvent {
    /// Creates an event stamped as stable now.
    #[inline]
    #[must_use]
    pub fn new(path: Utf8PathBuf, discovered_at: Instant) -> Self {
        Self {
            path,
            discovered_at,
            stable_at: Instant::now(),
        }
    }

    /// Returns the file name without the directory path.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }

    /// Returns the path as a borrowed [`Utf8Path`].
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Time between discovery and stability.
    #[inline]
    #[must_use]
    pub fn settle_time(&self) -> Duration {
        self.stable_at.saturating_duration_since(self.discovered_at)
    }
}
