//! Change debouncing for the file watcher.
//!
//! Editors emit several events per save and builds touch many files at once.
//! All changes recorded within the quiet period collapse into one batch, which
//! becomes a single reload.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Trailing-edge debouncer for changed paths.
///
/// Every recorded change pushes the deadline back by the quiet period; the
/// batch is released only once no change arrived for that long.
#[derive(Debug)]
pub(crate) struct ChangeDebouncer {
    quiet: Duration,
    pending: BTreeSet<PathBuf>,
    deadline: Option<Instant>,
}

impl ChangeDebouncer {
    pub(crate) fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: BTreeSet::new(),
            deadline: None,
        }
    }

    /// Record a change observed at `now`.
    pub(crate) fn record(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path);
        self.deadline = Some(now + self.quiet);
    }

    /// Take the pending batch if its deadline has passed.
    pub(crate) fn drain_ready(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                Some(std::mem::take(&mut self.pending).into_iter().collect())
            }
            _ => None,
        }
    }

    /// Deadline of the pending batch, if any.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
