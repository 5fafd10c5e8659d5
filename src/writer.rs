//! Atomic persistence of one scan.
//!
//! All entries found in a scan and the unit's new cursor are written in a
//! single transaction. If anything fails, the transaction is rolled back and
//! the in-memory cursor is put back where it was before the scan, so the
//! next attempt re-reads the same bytes and re-derives the same entries.

use tracing::{debug, error, warn};

use crate::event::JournalEvent;
use crate::store::{JournalStore, StoreError};
use crate::unit::{TrackedUnit, UnitId};

/// Persist `entries` and move `unit.cursor` to `new_cursor`, atomically.
///
/// On success `unit.cursor == new_cursor`. On failure `unit.cursor` is
/// restored to its value on entry and the store error is returned.
pub fn commit<S: JournalStore + ?Sized>(
    store: &mut S,
    unit_id: UnitId,
    unit: &mut TrackedUnit,
    entries: &[JournalEvent],
    new_cursor: u64,
) -> Result<(), StoreError> {
    let prior = unit.cursor;
    unit.cursor = new_cursor;

    match write_all(store, unit_id, entries, new_cursor) {
        Ok(()) => {
            debug!(
                file = %unit.name,
                count = entries.len(),
                cursor = new_cursor,
                "committed scan"
            );
            Ok(())
        }
        Err(e) => {
            unit.cursor = prior;
            warn!(
                file = %unit.name,
                error = %e,
                cursor = prior,
                "commit failed, cursor restored"
            );
            Err(e)
        }
    }
}

fn write_all<S: JournalStore + ?Sized>(
    store: &mut S,
    unit_id: UnitId,
    entries: &[JournalEvent],
    new_cursor: u64,
) -> Result<(), StoreError> {
    store.begin()?;

    if let Err(e) = insert_and_advance(store, unit_id, entries, new_cursor) {
        if let Err(rollback_err) = store.rollback() {
            error!(error = %rollback_err, "rollback failed");
        }
        return Err(e);
    }
    Ok(())
}

fn insert_and_advance<S: JournalStore + ?Sized>(
    store: &mut S,
    unit_id: UnitId,
    entries: &[JournalEvent],
    new_cursor: u64,
) -> Result<(), StoreError> {
    for event in entries {
        store.insert_entry(unit_id, event)?;
    }
    store.update_unit_cursor(unit_id, new_cursor)?;
    store.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_event_line;
    use crate::store::MemoryStore;
    use std::path::Path;

    fn events(n: usize) -> Vec<JournalEvent> {
        (0..n)
            .map(|i| {
                parse_event_line(&format!(
                    r#"{{"timestamp":"2017-10-06T12:00:{:02}Z","event":"Scan"}}"#,
                    i
                ))
                .unwrap()
            })
            .collect()
    }

    fn setup() -> (MemoryStore, UnitId, TrackedUnit) {
        let mut store = MemoryStore::new();
        let mut unit = TrackedUnit::for_path(Path::new("/j/journal01.log"));
        let id = store.create_unit(&unit).unwrap();
        unit.id = Some(id);
        (store, id, unit)
    }

    #[test]
    fn test_commit_persists_entries_and_cursor() {
        let (mut store, id, mut unit) = setup();
        commit(&mut store, id, &mut unit, &events(3), 300).unwrap();

        assert_eq!(unit.cursor, 300);
        assert_eq!(store.all_entries().len(), 3);
        let stored = store.find_unit_by_name("journal01.log").unwrap().unwrap();
        assert_eq!(stored.cursor, 300);
    }

    #[test]
    fn test_commit_cursor_only() {
        let (mut store, id, mut unit) = setup();
        commit(&mut store, id, &mut unit, &[], 42).unwrap();
        assert_eq!(unit.cursor, 42);
        assert!(store.all_entries().is_empty());
    }

    #[test]
    fn test_failed_commit_restores_cursor_and_leaves_nothing() {
        let (mut store, id, mut unit) = setup();
        unit.cursor = 100;
        store.fail_after_inserts(2);

        let err = commit(&mut store, id, &mut unit, &events(4), 500).unwrap_err();
        assert!(matches!(err, StoreError::Injected(_)));
        assert_eq!(unit.cursor, 100);
        assert!(store.all_entries().is_empty());
        let stored = store.find_unit_by_name("journal01.log").unwrap().unwrap();
        assert_eq!(stored.cursor, 0);

        // The retry from the same cursor succeeds and records all four.
        commit(&mut store, id, &mut unit, &events(4), 500).unwrap();
        assert_eq!(store.all_entries().len(), 4);
        assert_eq!(unit.cursor, 500);
    }

    #[test]
    fn test_unknown_unit_rolls_back() {
        let (mut store, _, mut unit) = setup();
        let err = commit(&mut store, UnitId(99), &mut unit, &events(1), 10).unwrap_err();
        assert!(matches!(err, StoreError::UnitNotFound(UnitId(99))));
        assert!(store.all_entries().is_empty());
        assert_eq!(unit.cursor, 0);
    }
}
