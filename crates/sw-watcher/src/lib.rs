//! Detects when files written into a directory have stopped changing.
//!
//! Producers such as copy jobs, uploads and recorders write files into a
//! directory without announcing when they are done. The only observable
//! signal of completion is that change notifications stop. This crate turns
//! that silence into an explicit [`StabilityEvent`] so downstream processing
//! (transcoding, ingestion) only ever sees complete files.
//!
//! # Overview
//!
//! - A directory monitor lists the files present at startup and follows
//!   create notifications for new ones.
//! - Every discovered file gets its own tracker task. The tracker re-arms a
//!   timer on each change notification for its path (a debounce, not a fixed
//!   delay) and, once the timer runs out, checks that the file still exists
//!   before reporting it.
//! - One shared cancellation token stops the monitor and every tracker.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ChangeSource (notify / manual)               │
//! └──────────┬───────────────────────────────────┬──────────────────┘
//!            │ directory subscription            │ one subscription per file
//!            ▼                                   ▼
//! ┌────────────────────┐   spawn   ┌──────────────────────────────┐
//! │ DirectoryMonitor   │ ────────► │ FileStabilityTracker × N     │
//! │ (existing + create)│           │ (timer reset on every change)│
//! └────────────────────┘           └──────────────┬───────────────┘
//!            ▲                                    │ StabilityEvent
//!            │ CancellationToken                  ▼
//! ┌────────────────────┐           ┌──────────────────────────────┐
//! │ StableFileWatcher  │ ◄──────── │ mpsc::Receiver               │
//! │ (close / shutdown) │           └──────────────────────────────┘
//! └────────────────────┘
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! sw-cli ──► sw-watcher ──► sw-core
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use sw_watcher::{CompositeFilter, ExtensionFilter, HiddenFileFilter, StableFileWatcher};
//! use sw_core::WatchConfig;
//! use camino::Utf8Path;
//!
//! # async fn example() -> Result<(), sw_watcher::WatchError> {
//! let config = WatchConfig::default(); // 500ms quiet period
//! let filter = CompositeFilter::new()
//!     .and(ExtensionFilter::new(&["mp4", "mkv"]))
//!     .and(HiddenFileFilter);
//!
//! let mut watcher =
//!     StableFileWatcher::from_config(Utf8Path::new("/srv/incoming"), &config, filter).await?;
//!
//! while let Some(event) = watcher.recv().await {
//!     println!("ready for transcoding: {}", event.path);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Construction either succeeds or returns a single [`WatchError`]. Problems
//! with individual files (a subscription that cannot be established, a file
//! deleted during its quiet period) are logged and that file simply never
//! produces an event.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod filter;
pub mod monitor;
pub mod source;
mod tracker;
pub mod watcher;

// Re-export error types
pub use error::WatchError;

// Re-export event types
pub use events::{ChangeKind, ChangeNotification, StabilityEvent};

// Re-export filter types
pub use filter::{
    AcceptAllFilter, CompositeFilter, ExtensionFilter, FileFilter, HiddenFileFilter,
    filter_from_config,
};

// Re-export source types
pub use source::{ChangeSource, ManualSource, NotifySource, Registration, Subscription};

// Re-export watcher types
pub use watcher::{CloseHandle, StableFileWatcher};
