//! The tick-driven live tailing loop.
//!
//! Each `poll_tick` does exactly one of, in priority order:
//!
//! 1. Continue the active journal. If that yields entries the tick ends
//!    there, so a fast-growing file is never starved by queued ones.
//! 2. Switch to the next queued journal and scan it.
//! 3. Count an idle tick. After `idle_threshold` idle ticks, and only once
//!    the active journal is caught up, list the directory and adopt the
//!    first journal the store has never seen. This is the backstop for
//!    notifications the OS coalesced or dropped.
//!
//! All state here is owned by the single thread calling `poll_tick`; the
//! change queue is the only thing shared with the watcher thread.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::arena::UnitArena;
use crate::backfill::{BackfillProgress, BackfillScanner, BackfillSummary};
use crate::cursor::{FileCursor, ReadOutcome};
use crate::dedup;
use crate::discovery::list_journal_files;
use crate::error::MonitorError;
use crate::event::JournalEvent;
use crate::merge::{ExtraInfoMerger, RetryPolicy};
use crate::queue::ChangeQueue;
use crate::store::JournalStore;
use crate::unit::{TrackedUnit, UnitId};
use crate::writer;

/// Default number of consecutive idle ticks before a reconciliation scan.
pub const DEFAULT_IDLE_THRESHOLD: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub idle_threshold: u32,
    pub merge_retry: RetryPolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            merge_retry: RetryPolicy::default(),
        }
    }
}

/// What the most recent tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    ContinuingFile(UnitId),
    SwitchingFile(UnitId),
    Reconciling,
}

// ---------------------------------------------------------------------------
// JournalMonitor
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct JournalMonitor<S> {
    root: PathBuf,
    store: S,
    settings: MonitorSettings,
    merger: ExtraInfoMerger,
    arena: UnitArena,
    active: Option<UnitId>,
    idle_ticks: u32,
    queue: Option<ChangeQueue>,
    state: ScanState,
}

impl<S: JournalStore> JournalMonitor<S> {
    pub fn new(root: impl Into<PathBuf>, store: S, settings: MonitorSettings) -> Self {
        Self {
            root: root.into(),
            store,
            settings,
            merger: ExtraInfoMerger::new(settings.merge_retry),
            arena: UnitArena::new(),
            active: None,
            idle_ticks: 0,
            queue: None,
            state: ScanState::Idle,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    pub fn is_watching(&self) -> bool {
        self.queue.is_some()
    }

    /// The unit currently being tailed, if any.
    pub fn active_unit(&self) -> Option<&TrackedUnit> {
        self.active
            .and_then(|id| self.arena.get(id))
            .map(FileCursor::unit)
    }

    // -- Watch lifecycle ------------------------------------------------------

    /// Start receiving change notifications for `dir`, which also becomes
    /// the directory used for reconciliation scans.
    ///
    /// # Errors
    ///
    /// Setup failures (missing directory, OS watch refused) are returned as
    /// `MonitorError::Watch` and are not retried.
    pub fn start_watching(&mut self, dir: impl Into<PathBuf>) -> Result<(), MonitorError> {
        let dir = dir.into();
        self.stop_watching();
        let queue = ChangeQueue::watch(&dir)?;
        self.root = dir;
        self.queue = Some(queue);
        Ok(())
    }

    /// Use an already-built queue instead of an OS watcher.
    pub fn attach_queue(&mut self, queue: ChangeQueue) {
        self.queue = Some(queue);
    }

    pub fn stop_watching(&mut self) {
        if self.queue.take().is_some() {
            info!(dir = %self.root.display(), "stopped watching journal directory");
        }
    }

    // -- Tick -----------------------------------------------------------------

    /// Run one scheduling step and return the entries it persisted.
    ///
    /// # Errors
    ///
    /// A failed commit is returned after the unit's cursor has been restored,
    /// so the next tick re-reads the same bytes.
    pub fn poll_tick(&mut self) -> Result<Vec<JournalEvent>, MonitorError> {
        if let Some(id) = self.active {
            if self.arena.get(id).is_some_and(FileCursor::exists) {
                self.state = ScanState::ContinuingFile(id);
                let entries = self.scan(id)?;
                if !entries.is_empty() {
                    self.idle_ticks = 0;
                    return Ok(entries);
                }
            } else {
                self.drop_unit(id);
            }
        }

        if let Some(path) = self.next_queued() {
            let id = self.arena.resolve(&mut self.store, &path)?;
            if self.active != Some(id) {
                info!(file = %path.display(), "switching to journal");
            }
            self.active = Some(id);
            self.state = ScanState::SwitchingFile(id);
            let entries = self.scan(id)?;
            self.count_tick(&entries);
            return Ok(entries);
        }

        if self.idle_ticks >= self.settings.idle_threshold && self.active_caught_up() {
            self.state = ScanState::Reconciling;
            self.idle_ticks = 0;
            return self.reconcile();
        }

        self.state = ScanState::Idle;
        self.idle_ticks = self.idle_ticks.saturating_add(1);
        Ok(Vec::new())
    }

    fn count_tick(&mut self, entries: &[JournalEvent]) {
        if entries.is_empty() {
            self.idle_ticks = self.idle_ticks.saturating_add(1);
        } else {
            self.idle_ticks = 0;
        }
    }

    /// Next queued path that still exists on disk.
    fn next_queued(&mut self) -> Option<PathBuf> {
        let queue = self.queue.as_mut()?;
        while let Some(path) = queue.try_next() {
            if path.is_file() {
                return Some(path);
            }
            debug!(file = %path.display(), "dropping queued journal that no longer exists");
        }
        None
    }

    fn active_caught_up(&self) -> bool {
        self.active
            .and_then(|id| self.arena.get(id))
            .map_or(true, FileCursor::is_caught_up)
    }

    fn drop_unit(&mut self, id: UnitId) {
        if let Some(cursor) = self.arena.remove(id) {
            info!(file = %cursor.unit().name, "journal disappeared, dropping handle");
        }
        if self.active == Some(id) {
            self.active = None;
        }
    }

    /// List the directory for journals the store has never seen and adopt
    /// the first one by name.
    fn reconcile(&mut self) -> Result<Vec<JournalEvent>, MonitorError> {
        let known: HashSet<String> = self
            .store
            .list_units()?
            .into_iter()
            .map(|u| u.name)
            .collect();

        let files =
            list_journal_files(&self.root, true).map_err(|source| MonitorError::Discovery {
                path: self.root.clone(),
                source,
            })?;

        let Some(file) = files.into_iter().find(|f| !known.contains(&f.name)) else {
            debug!("reconciliation found no untracked journals");
            return Ok(Vec::new());
        };

        info!(file = %file.name, "no activity but found untracked journal");
        let id = self.arena.resolve(&mut self.store, &file.path)?;
        self.active = Some(id);
        self.scan(id)
    }

    /// Read, dedup, enrich and commit whatever is new in unit `id`.
    fn scan(&mut self, id: UnitId) -> Result<Vec<JournalEvent>, MonitorError> {
        let Some(cursor) = self.arena.get(id) else {
            return Ok(Vec::new());
        };

        let batch = match cursor.read_new() {
            ReadOutcome::Batch(b) => b,
            ReadOutcome::Missing => {
                self.drop_unit(id);
                return Ok(Vec::new());
            }
        };
        if batch.end_offset == cursor.unit().cursor {
            return Ok(Vec::new());
        }

        let dir = cursor.unit().dir.clone();
        let mut fresh = Vec::with_capacity(batch.entries.len());
        for candidate in batch.entries {
            if !dedup::is_new(&self.store, &candidate)? {
                debug!(
                    event = %candidate.event.event_type,
                    timestamp = %candidate.event.timestamp,
                    "skipping already recorded entry"
                );
                continue;
            }
            let event = self
                .merger
                .try_enrich(&candidate.event, &dir)
                .unwrap_or(candidate.event);
            fresh.push(event);
        }

        let Some(cursor) = self.arena.get_mut(id) else {
            return Ok(Vec::new());
        };
        writer::commit(
            &mut self.store,
            id,
            cursor.unit_mut(),
            &fresh,
            batch.end_offset,
        )?;
        Ok(fresh)
    }

    // -- Backfill -------------------------------------------------------------

    /// Import every journal under the root, oldest first. The last journal
    /// processed becomes the active unit for live tailing.
    ///
    /// Must finish before live ticks run against the same directory.
    pub fn run_backfill(
        &mut self,
        cancel_check: impl Fn() -> bool,
        mut progress: impl FnMut(BackfillProgress),
        force_reload: bool,
    ) -> Result<BackfillSummary, MonitorError> {
        let summary = BackfillScanner::new(&self.root, &mut self.store, &mut self.arena).run(
            &cancel_check,
            &mut progress,
            force_reload,
        )?;
        if let Some(id) = summary.last_unit {
            self.active = Some(id);
        }
        self.idle_ticks = 0;
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
