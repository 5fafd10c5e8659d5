//! The persistence interface the monitor consumes, and an in-memory
//! implementation of it.
//!
//! The monitor is the only writer. Atomicity comes from `begin` / `commit` /
//! `rollback`: everything issued between `begin` and `commit` becomes visible
//! together or not at all.

use chrono::{DateTime, Utc};

use crate::event::JournalEvent;
use crate::unit::{PersistedEntry, TrackedUnit, UnitId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("unit not found: {0}")]
    UnitNotFound(UnitId),
    #[error("no transaction in progress")]
    NoTransaction,
    #[error("transaction already in progress")]
    NestedTransaction,
    #[error("injected failure: {0}")]
    Injected(String),
}

pub trait JournalStore {
    fn find_unit_by_name(&self, name: &str) -> Result<Option<TrackedUnit>, StoreError>;

    /// Insert a new unit and return its identity.
    fn create_unit(&mut self, unit: &TrackedUnit) -> Result<UnitId, StoreError>;

    fn update_unit_cursor(&mut self, id: UnitId, cursor: u64) -> Result<(), StoreError>;

    fn list_units(&self) -> Result<Vec<TrackedUnit>, StoreError>;

    /// Entries owned by `unit` with exactly this timestamp.
    fn find_entries(
        &self,
        unit: UnitId,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<PersistedEntry>, StoreError>;

    /// Every entry owned by `unit`.
    fn entries_for_unit(&self, unit: UnitId) -> Result<Vec<PersistedEntry>, StoreError>;

    fn insert_entry(&mut self, unit: UnitId, event: &JournalEvent) -> Result<i64, StoreError>;

    fn begin(&mut self) -> Result<(), StoreError>;
    fn commit(&mut self) -> Result<(), StoreError>;
    fn rollback(&mut self) -> Result<(), StoreError>;

    fn entry_count(&self, unit: UnitId) -> Result<usize, StoreError> {
        Ok(self.entries_for_unit(unit)?.len())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Snapshot {
    units: Vec<TrackedUnit>,
    entries: Vec<PersistedEntry>,
    next_unit_id: i64,
    next_entry_id: i64,
}

/// A `JournalStore` held entirely in memory.
///
/// `begin` snapshots the state and `rollback` restores it. Insert failures
/// can be injected to exercise interrupted commits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Snapshot,
    saved: Option<Snapshot>,
    fail_after_inserts: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the insert after the next `after` successful inserts fail. The
    /// trigger fires once.
    pub fn fail_after_inserts(&mut self, after: usize) {
        self.fail_after_inserts = Some(after);
    }

    /// Every entry in insertion order.
    pub fn all_entries(&self) -> &[PersistedEntry] {
        &self.state.entries
    }

    fn unit_mut(&mut self, id: UnitId) -> Result<&mut TrackedUnit, StoreError> {
        self.state
            .units
            .iter_mut()
            .find(|u| u.id == Some(id))
            .ok_or(StoreError::UnitNotFound(id))
    }
}

impl JournalStore for MemoryStore {
    fn find_unit_by_name(&self, name: &str) -> Result<Option<TrackedUnit>, StoreError> {
        Ok(self.state.units.iter().find(|u| u.name == name).cloned())
    }

    fn create_unit(&mut self, unit: &TrackedUnit) -> Result<UnitId, StoreError> {
        self.state.next_unit_id += 1;
        let id = UnitId(self.state.next_unit_id);
        let mut stored = unit.clone();
        stored.id = Some(id);
        self.state.units.push(stored);
        Ok(id)
    }

    fn update_unit_cursor(&mut self, id: UnitId, cursor: u64) -> Result<(), StoreError> {
        self.unit_mut(id)?.cursor = cursor;
        Ok(())
    }

    fn list_units(&self) -> Result<Vec<TrackedUnit>, StoreError> {
        Ok(self.state.units.clone())
    }

    fn find_entries(
        &self,
        unit: UnitId,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<PersistedEntry>, StoreError> {
        Ok(self
            .state
            .entries
            .iter()
            .filter(|e| e.unit_id == unit && e.timestamp == timestamp)
            .cloned()
            .collect())
    }

    fn entries_for_unit(&self, unit: UnitId) -> Result<Vec<PersistedEntry>, StoreError> {
        Ok(self
            .state
            .entries
            .iter()
            .filter(|e| e.unit_id == unit)
            .cloned()
            .collect())
    }

    fn insert_entry(&mut self, unit: UnitId, event: &JournalEvent) -> Result<i64, StoreError> {
        if let Some(remaining) = self.fail_after_inserts {
            if remaining == 0 {
                self.fail_after_inserts = None;
                return Err(StoreError::Injected("insert_entry".to_string()));
            }
            self.fail_after_inserts = Some(remaining - 1);
        }

        self.state.next_entry_id += 1;
        let id = self.state.next_entry_id;
        self.state.entries.push(PersistedEntry {
            id,
            unit_id: unit,
            timestamp: event.timestamp,
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
        });
        Ok(id)
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        if self.saved.is_some() {
            return Err(StoreError::NestedTransaction);
        }
        self.saved = Some(self.state.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.saved.take().ok_or(StoreError::NoTransaction)?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.state = self.saved.take().ok_or(StoreError::NoTransaction)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_event_line;
    use std::path::Path;

    fn event(ts: &str) -> JournalEvent {
        parse_event_line(&format!(r#"{{"timestamp":"{}","event":"Scan"}}"#, ts)).unwrap()
    }

    fn unit(name: &str) -> TrackedUnit {
        TrackedUnit::for_path(&Path::new("/journals").join(name))
    }

    #[test]
    fn test_create_and_find_unit() {
        let mut store = MemoryStore::new();
        let id = store.create_unit(&unit("journal01.log")).unwrap();

        let found = store.find_unit_by_name("journal01.log").unwrap().unwrap();
        assert_eq!(found.id, Some(id));
        assert!(store.find_unit_by_name("journal02.log").unwrap().is_none());
    }

    #[test]
    fn test_find_entries_by_unit_and_timestamp() {
        let mut store = MemoryStore::new();
        let a = store.create_unit(&unit("journalA.log")).unwrap();
        let b = store.create_unit(&unit("journalB.log")).unwrap();
        let ev = event("2017-10-06T12:00:00Z");
        store.insert_entry(a, &ev).unwrap();
        store.insert_entry(b, &ev).unwrap();
        store.insert_entry(a, &event("2017-10-06T12:00:01Z")).unwrap();

        assert_eq!(store.find_entries(a, ev.timestamp).unwrap().len(), 1);
        assert_eq!(store.entries_for_unit(a).unwrap().len(), 2);
        assert_eq!(store.entry_count(b).unwrap(), 1);
    }

    #[test]
    fn test_rollback_restores_state() {
        let mut store = MemoryStore::new();
        let id = store.create_unit(&unit("journal01.log")).unwrap();

        store.begin().unwrap();
        store.insert_entry(id, &event("2017-10-06T12:00:00Z")).unwrap();
        store.update_unit_cursor(id, 99).unwrap();
        store.rollback().unwrap();

        assert!(store.all_entries().is_empty());
        let found = store.find_unit_by_name("journal01.log").unwrap().unwrap();
        assert_eq!(found.cursor, 0);
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let mut store = MemoryStore::new();
        let id = store.create_unit(&unit("journal01.log")).unwrap();
        store.fail_after_inserts(1);

        assert!(store.insert_entry(id, &event("2017-10-06T12:00:00Z")).is_ok());
        assert!(matches!(
            store.insert_entry(id, &event("2017-10-06T12:00:01Z")),
            Err(StoreError::Injected(_))
        ));
        assert!(store.insert_entry(id, &event("2017-10-06T12:00:02Z")).is_ok());
    }

    #[test]
    fn test_commit_without_begin_is_error() {
        let mut store = MemoryStore::new();
        assert!(matches!(store.commit(), Err(StoreError::NoTransaction)));
        store.begin().unwrap();
        assert!(matches!(store.begin(), Err(StoreError::NestedTransaction)));
    }

    #[test]
    fn test_update_unknown_unit() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.update_unit_cursor(UnitId(42), 1),
            Err(StoreError::UnitNotFound(UnitId(42)))
        ));
    }
}
