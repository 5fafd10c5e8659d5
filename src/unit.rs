//! Durable bookkeeping types shared by the reader, the store and the
//! scheduler.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::event::{EventType, JournalEvent};

/// Persisted identity of a tracked journal file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub i64);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category flag of a tracked unit. Only `Journal` units are produced here;
/// other kinds may exist in a shared store and are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Journal,
    Other(i64),
}

const JOURNAL_KIND_CODE: i64 = 3;

impl UnitKind {
    pub fn code(self) -> i64 {
        match self {
            UnitKind::Journal => JOURNAL_KIND_CODE,
            UnitKind::Other(code) => code,
        }
    }

    pub fn from_code(code: i64) -> Self {
        if code == JOURNAL_KIND_CODE {
            UnitKind::Journal
        } else {
            UnitKind::Other(code)
        }
    }
}

// ---------------------------------------------------------------------------
// TrackedUnit
// ---------------------------------------------------------------------------

/// One journal file across process restarts.
///
/// `cursor` is the byte offset just past the last line that has been
/// committed. `id` is `None` until the unit is first inserted into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedUnit {
    pub id: Option<UnitId>,
    pub name: String,
    pub dir: PathBuf,
    pub kind: UnitKind,
    pub cursor: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl TrackedUnit {
    /// A fresh, not-yet-persisted journal unit for the file at `path`.
    pub fn for_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        Self {
            id: None,
            name,
            dir,
            kind: UnitKind::Journal,
            cursor: 0,
            modified,
        }
    }

    /// Full path of the journal file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A decoded event that has not yet passed dedup / enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEntry {
    pub unit_id: UnitId,
    pub event: JournalEvent,
}

/// A durable journal record.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEntry {
    pub id: i64,
    pub unit_id: UnitId,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub payload: Value,
}
