//! Duplicate suppression.
//!
//! Restarts, reconciliation scans and backfill can all re-observe bytes that
//! were already recorded. A candidate is a duplicate when the same owning
//! unit already holds an entry with the same timestamp, event type and
//! payload. For event types that can be enriched from a companion file the
//! stored payload only has to contain every field of the candidate, so an
//! enriched record is not duplicated by its own minimal journal line.
//!
//! Live tailing asks the store per candidate (`is_new`); backfill loads the
//! unit's entries once into an `ExistingIndex`. Both use `is_same_entry`, so
//! they reach the same verdicts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::event::JournalEvent;
use crate::merge::companion_file_name;
use crate::store::{JournalStore, StoreError};
use crate::unit::{CandidateEntry, PersistedEntry, UnitId};

/// `true` if `persisted` records the same business event as `candidate`.
pub fn is_same_entry(candidate: &JournalEvent, persisted: &PersistedEntry) -> bool {
    if candidate.timestamp != persisted.timestamp || candidate.event_type != persisted.event_type {
        return false;
    }
    if companion_file_name(&candidate.event_type).is_some() {
        payload_contained(&candidate.payload, &persisted.payload)
    } else {
        candidate.payload == persisted.payload
    }
}

fn payload_contained(candidate: &Value, persisted: &Value) -> bool {
    match (candidate, persisted) {
        (Value::Object(c), Value::Object(p)) => c.iter().all(|(k, v)| p.get(k) == Some(v)),
        _ => candidate == persisted,
    }
}

/// `true` if `entry` has not been recorded for its owning unit yet.
pub fn is_new<S: JournalStore + ?Sized>(
    store: &S,
    entry: &CandidateEntry,
) -> Result<bool, StoreError> {
    let existing = store.find_entries(entry.unit_id, entry.event.timestamp)?;
    Ok(!existing.iter().any(|p| is_same_entry(&entry.event, p)))
}

// ---------------------------------------------------------------------------
// ExistingIndex
// ---------------------------------------------------------------------------

/// A unit's persisted entries grouped by exact timestamp. A journal may log
/// several events at one instant, so each key holds all of them.
#[derive(Debug, Default)]
pub struct ExistingIndex {
    by_time: HashMap<DateTime<Utc>, Vec<PersistedEntry>>,
}

impl ExistingIndex {
    pub fn load<S: JournalStore + ?Sized>(store: &S, unit: UnitId) -> Result<Self, StoreError> {
        let mut by_time: HashMap<DateTime<Utc>, Vec<PersistedEntry>> = HashMap::new();
        for entry in store.entries_for_unit(unit)? {
            by_time.entry(entry.timestamp).or_default().push(entry);
        }
        Ok(Self { by_time })
    }

    pub fn contains(&self, event: &JournalEvent) -> bool {
        self.by_time
            .get(&event.timestamp)
            .is_some_and(|same_time| same_time.iter().any(|p| is_same_entry(event, p)))
    }

    pub fn len(&self) -> usize {
        self.by_time.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_time.is_empty()
    }
}
