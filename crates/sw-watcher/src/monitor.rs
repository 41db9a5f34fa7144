//! Directory-level discovery.
//!
//! The monitor finds candidate files (entries present at startup, then every
//! path reported as created) and starts one tracker per discovery. It never
//! waits on the trackers it starts; they end on their own or on the shared
//! cancellation signal.

use camino::{Utf8Path, Utf8PathBuf};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::error::WatchError;
use crate::filter::FileFilter;
use crate::source::{ChangeSource, Subscription};
use crate::tracker::{TrackerContext, track_file};

/// Lists the non-directory entries of `dir` that pass `filter`.
///
/// Entries with non-UTF-8 names are logged and skipped. The result is sorted
/// so startup tracking order is deterministic.
///
/// # Errors
///
/// Returns [`WatchError::ListDirectory`] if the directory cannot be read.
pub fn list_candidates<F: FileFilter + ?Sized>(
    dir: &Utf8Path,
    filter: &F,
) -> Result<Vec<Utf8PathBuf>, WatchError> {
    let list_error = |source| WatchError::ListDirectory {
        path: dir.to_owned(),
        source,
    };

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(list_error)? {
        let entry = entry.map_err(list_error)?;
        let file_type = entry.file_type().map_err(list_error)?;
        if file_type.is_dir() {
            continue;
        }

        let path = match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => path,
            Err(path) => {
                warn!(error = %WatchError::non_utf8_path(path), "Skipping existing entry");
                continue;
            }
        };

        if !filter.should_process(&path) {
            trace!(path = %path, "Filtered out existing file");
            continue;
        }

        info!(path = %path, "Found existing file");
        candidates.push(path);
    }

    candidates.sort();
    Ok(candidates)
}

/// The discovery loop for one watched directory.
pub(crate) struct DirectoryMonitor<S, F> {
    dir: Utf8PathBuf,
    subscription: Subscription,
    filter: F,
    context: TrackerContext<S>,
    trackers: TaskTracker,
}

impl<S: ChangeSource, F: FileFilter> DirectoryMonitor<S, F> {
    pub(crate) fn new(
        dir: Utf8PathBuf,
        subscription: Subscription,
        filter: F,
        context: TrackerContext<S>,
        trackers: TaskTracker,
    ) -> Self {
        Self {
            dir,
            subscription,
            filter,
            context,
            trackers,
        }
    }

    /// Tracks `preexisting`, then follows create notifications until cancelled.
    ///
    /// Dropping `self` on return releases the monitor's event sender; the
    /// event stream ends once the last tracker has released its own.
    pub(crate) async fn run(mut self, preexisting: Vec<Utf8PathBuf>) {
        // Files present at startup may still be mid-write, so they get the
        // same quiet-period test as new arrivals.
        for path in preexisting {
            self.spawn_tracker(path);
        }

        loop {
            tokio::select! {
                biased;

                () = self.context.cancel.cancelled() => {
                    debug!(dir = %self.dir, "Directory monitor cancelled");
                    break;
                }

                notification = self.subscription.recv() => match notification {
                    Some(notification) if notification.kind.is_create() => {
                        if self.filter.should_process(&notification.path) {
                            self.spawn_tracker(notification.path);
                        } else {
                            trace!(path = %notification.path, "Filtered out new file");
                        }
                    }
                    Some(notification) => {
                        trace!(
                            path = %notification.path,
                            kind = ?notification.kind,
                            "Ignoring directory notification"
                        );
                    }
                    None => {
                        warn!(dir = %self.dir, "Directory notification stream ended, stopping discovery");
                        break;
                    }
                },
            }
        }

        if let Err(error) = self.subscription.close() {
            debug!(dir = %self.dir, error = %error, "Failed to release directory subscription");
        }
        info!(dir = %self.dir, active_trackers = self.trackers.len(), "Directory monitor stopped");
    }

    fn spawn_tracker(&self, path: Utf8PathBuf) {
        if self.context.cancel.is_cancelled() {
            return;
        }
        // Each discovery gets its own tracker, even for a path that is
        // already being tracked after a delete and re-create.
        self.trackers.spawn(track_file(self.context.clone(), path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{AcceptAllFilter, ExtensionFilter};
    use std::fs;
    use tempfile::TempDir;

    fn utf8_dir(temp_dir: &TempDir) -> &Utf8Path {
        Utf8Path::from_path(temp_dir.path()).expect("Invalid path")
    }

    #[test]
    fn test_list_candidates_skips_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = utf8_dir(&temp_dir);
        fs::write(dir.join("b.mp4"), b"b").expect("Failed to write file");
        fs::write(dir.join("a.mp4"), b"a").expect("Failed to write file");
        fs::create_dir(dir.join("nested")).expect("Failed to create dir");

        let candidates = list_candidates(dir, &AcceptAllFilter).expect("Listing failed");

        assert_eq!(candidates, vec![dir.join("a.mp4"), dir.join("b.mp4")]);
    }

    #[test]
    fn test_list_candidates_applies_filter() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = utf8_dir(&temp_dir);
        fs::write(dir.join("a.mp4"), b"a").expect("Failed to write file");
        fs::write(dir.join("notes.txt"), b"n").expect("Failed to write file");

        let candidates =
            list_candidates(dir, &ExtensionFilter::new(&["mp4"])).expect("Listing failed");

        assert_eq!(candidates, vec![dir.join("a.mp4")]);
    }

    #[test]
    fn test_list_candidates_missing_directory() {
        let result = list_candidates(Utf8Path::new("/nonexistent/incoming"), &AcceptAllFilter);
        match result {
            Err(WatchError::ListDirectory { path, .. }) => {
                assert_eq!(path.as_str(), "/nonexistent/incoming");
            }
            other => panic!("Expected ListDirectory, got {other:?}"),
        }
    }
}
