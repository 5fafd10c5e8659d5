//! Change notification queue.
//!
//! A `notify` watcher on the journal directory pushes the path of every
//! created or modified journal file into an unbounded channel. The callback
//! runs on the watcher's own thread and does nothing else; the scheduler is
//! the only consumer. Delivery is at-least-once and unordered: the same path
//! may arrive many times, or for a file with nothing new to read.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::discovery::is_journal_file;

// ---------------------------------------------------------------------------
// WatchError
// ---------------------------------------------------------------------------

/// Errors that can occur when setting up the change watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The underlying `notify` crate returned an error.
    #[error("filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),
    /// The journal directory does not exist or is not accessible.
    #[error("journal directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),
}

// ---------------------------------------------------------------------------
// ChangeQueue
// ---------------------------------------------------------------------------

pub struct ChangeQueue {
    rx: mpsc::UnboundedReceiver<PathBuf>,
    // Dropping the watcher unregisters the OS watch.
    _watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for ChangeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeQueue")
            .field("watching", &self._watcher.is_some())
            .finish()
    }
}

impl ChangeQueue {
    /// Start watching `dir` (non-recursively) for journal create/modify
    /// notifications.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::DirectoryNotFound` if the directory does not
    /// exist, or `WatchError::Notify` if the OS watch cannot be registered.
    /// Setup failures are not retried.
    pub fn watch(dir: &Path) -> Result<Self, WatchError> {
        if !dir.is_dir() {
            return Err(WatchError::DirectoryNotFound(dir.to_path_buf()));
        }

        let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for path in journal_paths(&event) {
                        // The receiver is gone once the queue is dropped.
                        let _ = tx.send(path);
                    }
                }
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        info!(dir = %dir.display(), "watching journal directory");

        Ok(Self {
            rx,
            _watcher: Some(watcher),
        })
    }

    /// A queue with no OS watcher attached; paths are pushed through the
    /// returned sender instead.
    pub fn detached() -> (mpsc::UnboundedSender<PathBuf>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx, _watcher: None })
    }

    /// Take the next announced path, if any, without blocking.
    pub fn try_next(&mut self) -> Option<PathBuf> {
        self.rx.try_recv().ok()
    }
}

/// The journal paths a notify event announces. Only creates and
/// modifications are of interest.
pub(crate) fn journal_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .iter()
            .filter(|p| is_journal_file(p))
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
