//! Incremental reading of a single journal file.
//!
//! A `FileCursor` owns the in-memory copy of a `TrackedUnit` and knows how to
//! read the bytes appended since the unit's cursor. Only fully terminated
//! lines are consumed: a trailing line without `\n` stays on disk and is
//! re-read on the next call, so no event is ever split across reads and no
//! partial-line state has to survive a restart.
//!
//! Reading never moves the unit's cursor. The returned `ReadBatch` reports
//! where the consumed bytes end, and the transactional writer moves the
//! cursor only after the batch has been committed.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use tracing::{debug, warn};

use crate::event::parse_event_line;
use crate::unit::{CandidateEntry, TrackedUnit, UnitId};

/// Maximum number of bytes to read in a single `read_from` call.
/// Prevents OOM when a file grows very large between scans.
pub(crate) const MAX_READ_BYTES: u64 = 64 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Read results
// ---------------------------------------------------------------------------

/// The decoded entries between `start_offset` and `end_offset`.
///
/// `end_offset` always sits on a line boundary. `start_offset` equals the
/// requested offset unless the file was found truncated, in which case the
/// read restarted at 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadBatch {
    pub start_offset: u64,
    pub end_offset: u64,
    pub entries: Vec<CandidateEntry>,
}

impl ReadBatch {
    fn empty(offset: u64) -> Self {
        Self {
            start_offset: offset,
            end_offset: offset,
            entries: Vec::new(),
        }
    }

    /// `true` if the read consumed any bytes.
    pub fn advanced(&self) -> bool {
        self.end_offset != self.start_offset
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Batch(ReadBatch),
    /// The file no longer exists. The caller should drop its handle; the
    /// persisted unit is kept.
    Missing,
}

// ---------------------------------------------------------------------------
// FileCursor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileCursor {
    id: UnitId,
    unit: TrackedUnit,
}

impl FileCursor {
    pub fn new(id: UnitId, mut unit: TrackedUnit) -> Self {
        unit.id = Some(id);
        Self { id, unit }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn unit(&self) -> &TrackedUnit {
        &self.unit
    }

    pub fn unit_mut(&mut self) -> &mut TrackedUnit {
        &mut self.unit
    }

    pub fn exists(&self) -> bool {
        self.unit.path().is_file()
    }

    /// Current on-disk length, or `None` if the file cannot be stat'ed.
    pub fn file_len(&self) -> Option<u64> {
        std::fs::metadata(self.unit.path()).ok().map(|m| m.len())
    }

    /// `true` if the cursor has reached the file's current length (or the
    /// file is gone).
    pub fn is_caught_up(&self) -> bool {
        self.file_len().map_or(true, |len| self.unit.cursor >= len)
    }

    /// Read the complete lines appended since the unit's cursor.
    pub fn read_new(&self) -> ReadOutcome {
        self.read_from(self.unit.cursor)
    }

    /// Read the complete lines starting at `offset`, capped at
    /// `MAX_READ_BYTES`.
    pub fn read_from(&self, offset: u64) -> ReadOutcome {
        let path = self.unit.path();

        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return ReadOutcome::Missing,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "could not open journal");
                return ReadOutcome::Batch(ReadBatch::empty(offset));
            }
        };

        let file_len = match file.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "could not stat journal");
                return ReadOutcome::Batch(ReadBatch::empty(offset));
            }
        };

        // A file shorter than the cursor has been rewritten; start over and
        // let dedup absorb anything already recorded.
        let mut start = offset;
        if file_len < start {
            warn!(
                file = %path.display(),
                cursor = start,
                len = file_len,
                "journal truncated, re-reading from start"
            );
            start = 0;
        }

        if file_len == start {
            return ReadOutcome::Batch(ReadBatch::empty(start));
        }

        if let Err(e) = file.seek(SeekFrom::Start(start)) {
            warn!(file = %path.display(), error = %e, "could not seek in journal");
            return ReadOutcome::Batch(ReadBatch::empty(offset));
        }

        let read_limit = (file_len - start).min(MAX_READ_BYTES);
        let mut buf = Vec::with_capacity(read_limit as usize);
        if let Err(e) = file.take(read_limit).read_to_end(&mut buf) {
            warn!(file = %path.display(), error = %e, "could not read journal");
            return ReadOutcome::Batch(ReadBatch::empty(offset));
        }

        // Everything after the last newline is an unfinished line and is
        // left for the next read.
        let consumed = match buf.iter().rposition(|&b| b == b'\n') {
            Some(idx) => idx + 1,
            None if read_limit == MAX_READ_BYTES => {
                warn!(
                    file = %path.display(),
                    bytes = buf.len(),
                    "skipping oversized unterminated line"
                );
                return ReadOutcome::Batch(ReadBatch {
                    start_offset: start,
                    end_offset: start + buf.len() as u64,
                    entries: Vec::new(),
                });
            }
            None => 0,
        };

        let mut entries = Vec::new();
        for raw in buf[..consumed].split(|&b| b == b'\n') {
            let text = match std::str::from_utf8(raw) {
                Ok(t) => t,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping non-utf8 line");
                    continue;
                }
            };
            let trimmed = text.trim_start_matches('\u{feff}').trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse_event_line(trimmed) {
                Ok(event) => entries.push(CandidateEntry {
                    unit_id: self.id,
                    event,
                }),
                Err(e) => {
                    debug!(file = %path.display(), error = %e, "skipping malformed line");
                }
            }
        }

        ReadOutcome::Batch(ReadBatch {
            start_offset: start,
            end_offset: start + consumed as u64,
            entries,
        })
    }

    /// Read every complete line from `offset` to the current end of file,
    /// looping past the per-read cap.
    pub fn read_all_from(&self, offset: u64) -> ReadOutcome {
        let mut acc: Option<ReadBatch> = None;
        let mut next = offset;

        loop {
            let batch = match self.read_from(next) {
                ReadOutcome::Batch(b) => b,
                ReadOutcome::Missing => break,
            };
            let advanced = batch.advanced();
            next = batch.end_offset;
            match acc.as_mut() {
                None => acc = Some(batch),
                Some(total) => {
                    total.end_offset = batch.end_offset;
                    total.entries.extend(batch.entries);
                }
            }
            if !advanced {
                break;
            }
        }

        acc.map_or(ReadOutcome::Missing, ReadOutcome::Batch)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
