//! Per-file debounce tracking.
//!
//! A tracker owns the stability state machine for exactly one path. It
//! subscribes to notifications for that path, re-arms a single timer on every
//! notification, and reports the file once the timer runs out with the file
//! still on disk.
//!
//! ```text
//!            ┌──────── notification: reset deadline ───────┐
//!            ▼                                             │
//! subscribe ──► waiting ───────────────────────────────────┘
//!                 │ cancelled ──────────────────────► Cancelled
//!                 │ deadline passed
//!                 ▼
//!             file exists? ── no ──────────────────► Vanished
//!                 │ yes
//!                 ▼
//!             send StabilityEvent ──────────────────► Stable
//! ```
//!
//! Every tracker holds its own subscription, so fan-out grows with the number
//! of files in flight. Demultiplexing the directory subscription by path
//! would bound that without changing what callers observe.

use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::WatchError;
use crate::events::StabilityEvent;
use crate::source::{ChangeSource, Subscription};

/// Everything a tracker shares with the rest of the watcher.
pub(crate) struct TrackerContext<S> {
    /// Source for the tracker's own path-scoped subscription.
    pub(crate) source: Arc<S>,
    /// Quiet period required before a file is stable.
    pub(crate) threshold: Duration,
    /// Shared shutdown signal.
    pub(crate) cancel: CancellationToken,
    /// Where stability events go. Trackers send, never close.
    pub(crate) sink: mpsc::Sender<StabilityEvent>,
}

impl<S> Clone for TrackerContext<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            threshold: self.threshold,
            cancel: self.cancel.clone(),
            sink: self.sink.clone(),
        }
    }
}

/// How a tracker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackOutcome {
    /// The file settled and an event was delivered.
    Stable,
    /// The file was gone when the quiet period ended.
    Vanished,
    /// Shutdown was requested, or the event receiver went away.
    Cancelled,
    /// No subscription could be established for the file.
    SubscribeFailed,
    /// The notification stream ended before the file settled.
    SourceClosed,
}

/// Tracks `path` until it is stable, vanishes, or the watcher shuts down.
pub(crate) async fn track_file<S: ChangeSource>(
    context: TrackerContext<S>,
    path: Utf8PathBuf,
) -> TrackOutcome {
    let discovered_at = Instant::now();

    let mut subscription = match subscribe(context.source.as_ref(), &path) {
        Ok(subscription) => subscription,
        Err(error) => {
            warn!(error = %error, "Skipping file");
            return TrackOutcome::SubscribeFailed;
        }
    };

    debug!(path = %path, threshold_ms = context.threshold.as_millis(), "Tracking file");
    let outcome = wait_until_stable(&context, &path, &mut subscription, discovered_at).await;

    if let Err(error) = subscription.close() {
        debug!(path = %path, error = %error, "Failed to release file subscription");
    }
    debug!(path = %path, ?outcome, "Tracker finished");
    outcome
}

fn subscribe<S: ChangeSource + ?Sized>(
    source: &S,
    path: &Utf8Path,
) -> Result<Subscription, WatchError> {
    let to_error = |source| WatchError::Subscribe {
        path: path.to_owned(),
        source,
    };
    let mut subscription = source.subscribe().map_err(to_error)?;
    subscription.add(path).map_err(to_error)?;
    Ok(subscription)
}

async fn wait_until_stable<S>(
    context: &TrackerContext<S>,
    path: &Utf8Path,
    subscription: &mut Subscription,
    discovered_at: Instant,
) -> TrackOutcome {
    let timer = sleep(context.threshold);
    tokio::pin!(timer);

    loop {
        // Branch order matters: a notification that is ready alongside the
        // deadline must re-arm the timer rather than lose to it.
        tokio::select! {
            biased;

            () = context.cancel.cancelled() => return TrackOutcome::Cancelled,

            notification = subscription.recv() => {
                let Some(notification) = notification else {
                    warn!(path = %path, "Notification stream ended before file settled");
                    return TrackOutcome::SourceClosed;
                };
                trace!(path = %path, kind = ?notification.kind, "Change observed, re-arming timer");
                // Replaces the only pending deadline; an expired one cannot fire late.
                timer.as_mut().reset(Instant::now() + context.threshold);
            }

            () = &mut timer => return emit_if_present(context, path, discovered_at).await,
        }
    }
}

async fn emit_if_present<S>(
    context: &TrackerContext<S>,
    path: &Utf8Path,
    discovered_at: Instant,
) -> TrackOutcome {
    if let Err(source) = tokio::fs::metadata(path).await {
        let error = WatchError::Vanished {
            path: path.to_owned(),
            source,
        };
        warn!(error = %error, "File vanished before it settled");
        return TrackOutcome::Vanished;
    }

    let event = StabilityEvent::new(path.to_owned(), discovered_at);
    tokio::select! {
        biased;

        () = context.cancel.cancelled() => TrackOutcome::Cancelled,

        sent = context.sink.send(event) => {
            if sent.is_ok() {
                debug!(path = %path, "File is stable");
                TrackOutcome::Stable
            } else {
                debug!(path = %path, "Event receiver dropped, discarding stability event");
                TrackOutcome::Cancelled
            }
        }
    }
}
