//! Error types for the sw-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while constructing the watcher or tracking an individual file.

use camino::Utf8PathBuf;

/// Errors that can occur during stable file watching.
///
/// # Error Recovery Strategy
///
/// Errors fall into two tiers:
///
/// - **Construction-time** (fatal): [`WatchError::PathNotFound`],
///   [`WatchError::NotADirectory`], [`WatchError::Config`],
///   [`WatchError::CreateSource`],
///   [`WatchError::ListDirectory`], [`WatchError::RegisterDirectory`],
///   [`WatchError::Io`] and [`WatchError::MonitorFailed`]. These are returned
///   to the caller and the watcher is not usable.
/// - **Per-file** (recoverable): [`WatchError::Subscribe`],
///   [`WatchError::Vanished`] and [`WatchError::NonUtf8Path`]. These are
///   logged, the affected file is skipped and nothing else is disturbed.
///
/// # Examples
///
/// ```
/// use sw_watcher::WatchError;
///
/// fn handle_error(err: &WatchError) {
///     if err.is_fatal() {
///         eprintln!("watcher unusable: {err}");
///     } else {
///         eprintln!("skipping file: {err}");
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The watched directory does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// The watched path exists but is not a directory.
    #[error("path is not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    /// The watcher configuration is invalid.
    #[error("invalid watcher configuration: {0}")]
    Config(#[from] sw_core::ConfigError),

    /// The notification source could not be created.
    #[error("unable to create a file system watcher: {0}")]
    CreateSource(#[source] notify::Error),

    /// The initial directory listing failed.
    #[error("unable to list {path}: {source}")]
    ListDirectory {
        /// The directory being listed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The directory could not be registered with the notification source.
    #[error("unable to start watching {path}: {source}")]
    RegisterDirectory {
        /// The directory being registered.
        path: Utf8PathBuf,
        /// The underlying notify error.
        #[source]
        source: notify::Error,
    },

    /// A per-file notification subscription could not be established.
    #[error("unable to watch {path}, skipping: {source}")]
    Subscribe {
        /// The file that was skipped.
        path: Utf8PathBuf,
        /// The underlying notify error.
        #[source]
        source: notify::Error,
    },

    /// The file disappeared before its quiet period elapsed.
    #[error("unable to stat {path}, skipping: {source}")]
    Vanished {
        /// The file that disappeared.
        path: Utf8PathBuf,
        /// The error returned by the existence check.
        #[source]
        source: std::io::Error,
    },

    /// The directory monitor task panicked or was aborted.
    #[error("directory monitor task failed")]
    MonitorFailed(#[source] tokio::task::JoinError),

    /// A path is not valid UTF-8.
    ///
    /// This crate uses UTF-8 paths throughout. Non-UTF-8 entries are logged
    /// and skipped.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// An I/O error occurred while resolving the watched directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if this error only affects a single file.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Subscribe { .. } | Self::Vanished { .. } | Self::NonUtf8Path(_)
        )
    }

    /// Returns `true` if this error makes the watcher unusable.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::PathNotFound(path) | Self::NotADirectory(path) => Some(path),
            Self::ListDirectory { path, .. }
            | Self::RegisterDirectory { path, .. }
            | Self::Subscribe { path, .. }
            | Self::Vanished { path, .. } => Some(path),
            Self::Config(_)
            | Self::CreateSource(_)
            | Self::MonitorFailed(_)
            | Self::NonUtf8Path(_)
            | Self::Io(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_watch_error_path_not_found() {
        let err = WatchError::path_not_found("/srv/incoming");
        assert!(err.is_fatal());
        assert_eq!(err.path().map(|p| p.as_str()), Some("/srv/incoming"));
        insta::assert_snapshot!(err.to_string(), @"path does not exist: /srv/incoming");
    }

    #[test]
    fn test_watch_error_list_directory() {
        let err = WatchError::ListDirectory {
            path: Utf8PathBuf::from("/srv/incoming"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        };
        assert!(err.is_fatal());
        insta::assert_snapshot!(err.to_string(), @"unable to list /srv/incoming: access denied");
    }

    #[test]
    fn test_watch_error_register_directory() {
        let err = WatchError::RegisterDirectory {
            path: Utf8PathBuf::from("/srv/incoming"),
            source: notify::Error::generic("inotify limit reached"),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().starts_with("unable to start watching /srv/incoming"));
    }

    #[test]
    fn test_watch_error_subscribe_is_recoverable() {
        let err = WatchError::Subscribe {
            path: Utf8PathBuf::from("/srv/incoming/a.mp4"),
            source: notify::Error::path_not_found(),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.path().map(|p| p.as_str()), Some("/srv/incoming/a.mp4"));
    }

    #[test]
    fn test_watch_error_vanished_is_recoverable() {
        let err = WatchError::Vanished {
            path: Utf8PathBuf::from("/srv/incoming/b.mp4"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.is_recoverable());
        insta::assert_snapshot!(err.to_string(), @"unable to stat /srv/incoming/b.mp4, skipping: gone");
    }

    #[test]
    fn test_watch_error_non_utf8() {
        let err = WatchError::non_utf8_path(PathBuf::from("test"));
        assert!(err.is_recoverable());
        assert!(err.path().is_none());
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_watch_error_from_config_error() {
        let err: WatchError =
            sw_core::ConfigError::invalid_option("channel_capacity", "must be greater than zero")
                .into();
        assert!(err.is_fatal());
        assert!(err.path().is_none());
        assert!(err.to_string().contains("channel_capacity"));
    }

    #[tokio::test]
    async fn test_watch_error_monitor_failed() {
        let join_error = tokio::spawn(async { std::future::pending::<()>().await });
        join_error.abort();
        let join_error = join_error.await.expect_err("Aborted task should fail");

        let err = WatchError::MonitorFailed(join_error);
        assert!(err.is_fatal());
        assert!(err.path().is_none());
        assert!(std::error::Error::source(&err).is_some());
        insta::assert_snapshot!(err.to_string(), @"directory monitor task failed");
    }
}
