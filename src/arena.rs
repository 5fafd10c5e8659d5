//! Per-file cursors owned by the scan loop.
//!
//! Cursors are keyed by their persisted `UnitId`; a name index maps journal
//! file names to ids. The arena is owned by whichever component drives scans
//! and is never shared across threads.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::cursor::FileCursor;
use crate::store::{JournalStore, StoreError};
use crate::unit::{TrackedUnit, UnitId};

#[derive(Debug, Default)]
pub struct UnitArena {
    cursors: HashMap<UnitId, FileCursor>,
    by_name: HashMap<String, UnitId>,
}

impl UnitArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: UnitId) -> Option<&FileCursor> {
        self.cursors.get(&id)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut FileCursor> {
        self.cursors.get_mut(&id)
    }

    pub fn id_for_name(&self, name: &str) -> Option<UnitId> {
        self.by_name.get(name).copied()
    }

    /// Drop the in-memory handle for `id`. The persisted unit is untouched.
    pub fn remove(&mut self, id: UnitId) -> Option<FileCursor> {
        let cursor = self.cursors.remove(&id)?;
        self.by_name.remove(&cursor.unit().name);
        Some(cursor)
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Resolve the journal at `path` to a cursor: reuse the loaded one, load
    /// the persisted unit by file name, or create and persist a new unit
    /// with cursor 0.
    pub fn resolve<S: JournalStore + ?Sized>(
        &mut self,
        store: &mut S,
        path: &Path,
    ) -> Result<UnitId, StoreError> {
        let fresh = TrackedUnit::for_path(path);

        if let Some(id) = self.by_name.get(&fresh.name).copied() {
            if let Some(cursor) = self.cursors.get_mut(&id) {
                cursor.unit_mut().dir = fresh.dir;
            }
            return Ok(id);
        }

        let (id, unit) = match store.find_unit_by_name(&fresh.name)? {
            Some(mut unit) => {
                let id = unit.id.ok_or_else(|| {
                    StoreError::Corrupt(format!("unit {} has no id", unit.name))
                })?;
                unit.dir = fresh.dir;
                (id, unit)
            }
            None => {
                let id = store.create_unit(&fresh)?;
                info!(file = %fresh.name, unit = %id, "tracking new journal");
                (id, fresh)
            }
        };

        self.by_name.insert(unit.name.clone(), id);
        self.cursors.insert(id, FileCursor::new(id, unit));
        Ok(id)
    }
}
