pub mod arena;
pub mod backfill;
pub mod cli;
pub mod config;
pub mod cursor;
pub mod dedup;
pub mod discovery;
pub mod error;
pub mod event;
pub mod merge;
pub mod queue;
pub mod runner;
pub mod scheduler;
pub mod sqlite;
pub mod store;
pub mod unit;
pub mod writer;

pub use backfill::{BackfillProgress, BackfillSummary};
pub use error::MonitorError;
pub use event::{EventType, JournalEvent};
pub use scheduler::{JournalMonitor, MonitorSettings, ScanState};
pub use sqlite::SqliteStore;
pub use store::{JournalStore, MemoryStore, StoreError};
pub use unit::{TrackedUnit, UnitId};
