//! SQLite-backed `JournalStore`.
//!
//! Timestamps are stored as fixed-precision RFC 3339 UTC strings so that an
//! equality lookup on `event_time` matches exactly the instants the decoder
//! produced.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::warn;

use crate::event::{EventType, JournalEvent};
use crate::store::{JournalStore, StoreError};
use crate::unit::{PersistedEntry, TrackedUnit, UnitId, UnitKind};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS units (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    name     TEXT NOT NULL UNIQUE,
    dir      TEXT NOT NULL,
    kind     INTEGER NOT NULL,
    cursor   INTEGER NOT NULL DEFAULT 0,
    modified TEXT
);
CREATE TABLE IF NOT EXISTS entries (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    unit_id    INTEGER NOT NULL REFERENCES units(id),
    event_time TEXT NOT NULL,
    event_type TEXT NOT NULL,
    payload    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS entries_unit_time ON entries(unit_id, event_time);
";

const UNIT_COLUMNS: &str = "id, name, dir, kind, cursor, modified";
const ENTRY_COLUMNS: &str = "id, unit_id, event_time, event_type, payload";

fn time_key(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {:?}: {}", s, e)))
}

type UnitRow = (i64, String, String, i64, i64, Option<String>);
type EntryRow = (i64, i64, String, String, String);

fn unit_row(row: &Row<'_>) -> rusqlite::Result<UnitRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn entry_row(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn unit_from_row(row: UnitRow) -> Result<TrackedUnit, StoreError> {
    let (id, name, dir, kind, cursor, modified) = row;
    Ok(TrackedUnit {
        id: Some(UnitId(id)),
        name,
        dir: dir.into(),
        kind: UnitKind::from_code(kind),
        cursor: u64::try_from(cursor)
            .map_err(|_| StoreError::Corrupt(format!("negative cursor {}", cursor)))?,
        modified: modified.as_deref().map(parse_time).transpose()?,
    })
}

fn entry_from_row(row: EntryRow) -> Result<PersistedEntry, StoreError> {
    let (id, unit_id, event_time, event_type, payload) = row;
    Ok(PersistedEntry {
        id,
        unit_id: UnitId(unit_id),
        timestamp: parse_time(&event_time)?,
        event_type: EventType::from_name(&event_type),
        payload: serde_json::from_str(&payload)?,
    })
}

pub struct SqliteStore {
    conn: Connection,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        match conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0)) {
            Ok(mode) if mode.eq_ignore_ascii_case("wal") => {}
            Ok(mode) => warn!(path = %path.display(), %mode, "database refused WAL journal mode"),
            Err(e) => warn!(path = %path.display(), error = %e, "could not enable WAL journal mode"),
        }
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn query_entries(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<PersistedEntry>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, entry_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(entry_from_row).collect()
    }
}

impl JournalStore for SqliteStore {
    fn find_unit_by_name(&self, name: &str) -> Result<Option<TrackedUnit>, StoreError> {
        let sql = format!("SELECT {} FROM units WHERE name = ?1", UNIT_COLUMNS);
        self.conn
            .query_row(&sql, params![name], unit_row)
            .optional()?
            .map(unit_from_row)
            .transpose()
    }

    fn create_unit(&mut self, unit: &TrackedUnit) -> Result<UnitId, StoreError> {
        self.conn.execute(
            "INSERT INTO units (name, dir, kind, cursor, modified) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                unit.name,
                unit.dir.to_string_lossy().into_owned(),
                unit.kind.code(),
                unit.cursor as i64,
                unit.modified.map(time_key),
            ],
        )?;
        Ok(UnitId(self.conn.last_insert_rowid()))
    }

    fn update_unit_cursor(&mut self, id: UnitId, cursor: u64) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE units SET cursor = ?1 WHERE id = ?2",
            params![cursor as i64, id.0],
        )?;
        if changed == 0 {
            return Err(StoreError::UnitNotFound(id));
        }
        Ok(())
    }

    fn list_units(&self) -> Result<Vec<TrackedUnit>, StoreError> {
        let sql = format!("SELECT {} FROM units ORDER BY id", UNIT_COLUMNS);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map([], unit_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(unit_from_row).collect()
    }

    fn find_entries(
        &self,
        unit: UnitId,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<PersistedEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM entries WHERE unit_id = ?1 AND event_time = ?2 ORDER BY id",
            ENTRY_COLUMNS
        );
        self.query_entries(&sql, params![unit.0, time_key(timestamp)])
    }

    fn entries_for_unit(&self, unit: UnitId) -> Result<Vec<PersistedEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM entries WHERE unit_id = ?1 ORDER BY id",
            ENTRY_COLUMNS
        );
        self.query_entries(&sql, params![unit.0])
    }

    fn insert_entry(&mut self, unit: UnitId, event: &JournalEvent) -> Result<i64, StoreError> {
        let payload = serde_json::to_string(&event.payload)?;
        self.conn.execute(
            "INSERT INTO entries (unit_id, event_time, event_type, payload) VALUES (?1, ?2, ?3, ?4)",
            params![
                unit.0,
                time_key(event.timestamp),
                event.event_type.as_str(),
                payload
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            return Err(StoreError::NestedTransaction);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            return Err(StoreError::NoTransaction);
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            return Err(StoreError::NoTransaction);
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn entry_count(&self, unit: UnitId) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE unit_id = ?1",
            params![unit.0],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
