//! Historical import of every journal under the root.
//!
//! Files are processed oldest-modified first so the most recently written
//! journal is handled last and is the natural hand-off point for live
//! tailing. A file is re-read only if its cursor differs from its length,
//! or if it is the last file (so the hand-off always starts from fresh
//! state). Each file's new entries are reconciled against everything the
//! unit already holds and committed in their own transaction.
//!
//! Cancellation is polled between files; a commit in progress always
//! completes or rolls back.

use std::path::Path;

use tracing::{info, warn};

use crate::arena::UnitArena;
use crate::cursor::ReadOutcome;
use crate::dedup::ExistingIndex;
use crate::discovery::{list_journal_files, sort_by_modified};
use crate::error::MonitorError;
use crate::event::JournalEvent;
use crate::store::JournalStore;
use crate::unit::UnitId;
use crate::writer;

/// Progress reported while a backfill runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillProgress {
    /// `percent` of the selected files have been committed; `file` is the
    /// one just finished.
    Percent { percent: u32, file: String },
    /// Emitted once after the last file.
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub files_seen: usize,
    pub files_scanned: usize,
    pub entries_added: usize,
    pub cancelled: bool,
    /// The last unit committed; live tailing continues from here.
    pub last_unit: Option<UnitId>,
}

pub struct BackfillScanner<'a, S: ?Sized> {
    root: &'a Path,
    store: &'a mut S,
    arena: &'a mut UnitArena,
}

impl<'a, S: JournalStore + ?Sized> BackfillScanner<'a, S> {
    pub fn new(root: &'a Path, store: &'a mut S, arena: &'a mut UnitArena) -> Self {
        Self { root, store, arena }
    }

    pub fn run(
        self,
        cancel_check: &dyn Fn() -> bool,
        progress: &mut dyn FnMut(BackfillProgress),
        force_reload: bool,
    ) -> Result<BackfillSummary, MonitorError> {
        let mut files =
            list_journal_files(self.root, true).map_err(|source| MonitorError::Discovery {
                path: self.root.to_path_buf(),
                source,
            })?;
        sort_by_modified(&mut files);

        let mut summary = BackfillSummary {
            files_seen: files.len(),
            ..Default::default()
        };
        info!(dir = %self.root.display(), files = files.len(), force_reload, "starting backfill");

        // Resolve every file first so all units exist before any is read.
        let last_index = files.len().saturating_sub(1);
        let mut selected: Vec<UnitId> = Vec::new();
        for (i, file) in files.iter().enumerate() {
            let id = self.arena.resolve(&mut *self.store, &file.path)?;
            let Some(cursor) = self.arena.get_mut(id) else {
                continue;
            };
            if force_reload {
                cursor.unit_mut().cursor = 0;
            }
            if (cursor.unit().cursor != file.len || i == last_index) && !selected.contains(&id) {
                selected.push(id);
            }
        }

        let total = selected.len();
        for (i, &id) in selected.iter().enumerate() {
            if cancel_check() {
                info!(done = i, total, "backfill cancelled");
                summary.cancelled = true;
                return Ok(summary);
            }

            let Some(cursor) = self.arena.get(id) else {
                continue;
            };
            let name = cursor.unit().name.clone();

            let batch = match cursor.read_all_from(cursor.unit().cursor) {
                ReadOutcome::Batch(b) => b,
                ReadOutcome::Missing => {
                    warn!(file = %name, "journal vanished during backfill");
                    self.arena.remove(id);
                    continue;
                }
            };

            let existing = ExistingIndex::load(&*self.store, id)?;
            let fresh: Vec<JournalEvent> = batch
                .entries
                .into_iter()
                .map(|c| c.event)
                .filter(|event| !existing.contains(event))
                .collect();

            let Some(cursor) = self.arena.get_mut(id) else {
                continue;
            };
            writer::commit(&mut *self.store, id, cursor.unit_mut(), &fresh, batch.end_offset)?;

            summary.files_scanned += 1;
            summary.entries_added += fresh.len();
            summary.last_unit = Some(id);

            let percent = ((i + 1) * 100 / total) as u32;
            info!(file = %name, added = fresh.len(), percent, "backfilled journal");
            progress(BackfillProgress::Percent {
                percent,
                file: name,
            });
        }

        progress(BackfillProgress::Done);
        info!(
            scanned = summary.files_scanned,
            added = summary.entries_added,
            "backfill complete"
        );
        Ok(summary)
    }
}
