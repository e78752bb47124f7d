//! Filesystem watcher that triggers reloads.
//!
//! An optional second trigger source next to `/sse/reload`: changes under the
//! served root that match the watch patterns are debounced and turned into a
//! single broadcast per batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::broker::Broker;
use super::debouncer::ChangeDebouncer;

/// Running file watcher. Watching stops when this is dropped.
pub(crate) struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be resolved, a pattern is invalid,
    /// or the watcher cannot be created.
    pub(crate) fn start(
        root: &Path,
        patterns: &[String],
        quiet: Duration,
        broker: Arc<Broker>,
    ) -> Result<Self, WatchError> {
        let root = std::fs::canonicalize(root)?;
        let patterns = patterns
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        let (tx, rx) = mpsc::channel::<Event>(100);
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                // The callback runs on notify's own thread.
                Ok(event) => {
                    let _ = tx.blocking_send(event);
                }
                Err(e) => tracing::warn!(error = %e, "File watcher error"),
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        tracing::info!(root = %root.display(), "Watching for changes");
        tokio::spawn(process_events(rx, root, patterns, quiet, broker));

        Ok(Self { _watcher: watcher })
    }
}

/// Error starting the file watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Root could not be resolved.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid watch pattern.
    #[error("Invalid watch pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    /// Watcher backend failure.
    #[error("{0}")]
    Notify(#[from] notify::Error),
}

/// Record matching events and broadcast once per debounced batch.
///
/// Ends when the watcher, and with it the event sender, is dropped.
async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    root: PathBuf,
    patterns: Vec<glob::Pattern>,
    quiet: Duration,
    broker: Arc<Broker>,
) {
    let mut debouncer = ChangeDebouncer::new(quiet);

    loop {
        let deadline = debouncer.next_deadline();
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                for path in changed_paths(&event, &root, &patterns) {
                    tracing::debug!(path = %path.display(), "Recorded change");
                    debouncer.record(path, Instant::now());
                }
            }
            () = sleep_until(deadline) => {
                if let Some(batch) = debouncer.drain_ready(Instant::now()) {
                    let report = broker.reload();
                    tracing::info!(
                        changed = batch.len(),
                        delivered = report.delivered,
                        dropped = report.dropped,
                        "Reload broadcast after file change"
                    );
                }
            }
        }
    }
}

/// Sleep until `deadline`, or forever if there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

/// Paths of `event` that are relevant for a reload.
fn changed_paths(event: &Event, root: &Path, patterns: &[glob::Pattern]) -> Vec<PathBuf> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter(|path| matches_patterns(path, root, patterns))
        .cloned()
        .collect()
}

/// Check if `path` lies under `root` and matches any pattern.
fn matches_patterns(path: &Path, root: &Path, patterns: &[glob::Pattern]) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    patterns.iter().any(|p| p.matches_path(relative))
}
