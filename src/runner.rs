//! Command drivers behind the `watch`, `backfill` and `status` subcommands.
//!
//! The monitor itself is synchronous, so each driver moves it onto a tokio
//! blocking task and ticks it there until the shutdown flag flips.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backfill::{BackfillProgress, BackfillSummary};
use crate::cli::{BackfillArgs, WatchArgs};
use crate::config::AppConfig;
use crate::error::MonitorError;
use crate::scheduler::JournalMonitor;
use crate::sqlite::SqliteStore;
use crate::store::{JournalStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("no journal directory configured (use --dir or set journal_dir in the config file)")]
    NoJournalDir,
    #[error("no database path configured (use --db or set database in the config file)")]
    NoDatabase,
    #[error("could not create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Open the configured database, creating its parent directory if needed.
pub fn open_store(config: &AppConfig) -> Result<SqliteStore, RunError> {
    let path = config.database.as_deref().ok_or(RunError::NoDatabase)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| RunError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    debug!(path = %path.display(), "opening store");
    Ok(SqliteStore::open(path)?)
}

/// Flag set once Ctrl-C is received.
fn shutdown_on_ctrl_c() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            flag.store(true, Ordering::SeqCst);
        }
    });
    shutdown
}

fn journal_dir(config: &AppConfig) -> Result<PathBuf, RunError> {
    config.journal_dir.clone().ok_or(RunError::NoJournalDir)
}

fn log_progress(progress: BackfillProgress) {
    match progress {
        BackfillProgress::Percent { percent, file } => {
            info!(percent, file = %file, "backfill progress")
        }
        BackfillProgress::Done => info!("backfill done"),
    }
}

fn backfill_blocking(
    monitor: &mut JournalMonitor<SqliteStore>,
    shutdown: &AtomicBool,
    force_reload: bool,
) -> Result<BackfillSummary, MonitorError> {
    monitor.run_backfill(
        || shutdown.load(Ordering::SeqCst),
        log_progress,
        force_reload,
    )
}

// ---------------------------------------------------------------------------
// watch
// ---------------------------------------------------------------------------

/// Live-tail the journal directory until interrupted, optionally importing
/// history first.
pub async fn run_watch(config: &AppConfig, args: &WatchArgs) -> Result<(), RunError> {
    let dir = journal_dir(config)?;
    let store = open_store(config)?;
    let tick = config.scan.tick_interval;
    let mut monitor = JournalMonitor::new(&dir, store, config.monitor_settings());
    let shutdown = shutdown_on_ctrl_c();
    let backfill = args.backfill;
    let force_reload = args.force_reload;

    let worker = tokio::task::spawn_blocking(move || -> Result<(), MonitorError> {
        if backfill {
            let summary = backfill_blocking(&mut monitor, &shutdown, force_reload)?;
            if summary.cancelled {
                return Ok(());
            }
        }

        monitor.start_watching(&dir)?;
        info!(dir = %dir.display(), tick_ms = tick.as_millis() as u64, "watching journals");

        while !shutdown.load(Ordering::SeqCst) {
            match monitor.poll_tick() {
                Ok(events) => {
                    for event in &events {
                        debug!(event = %event.event_type, timestamp = %event.timestamp, "ingested");
                    }
                }
                // State was rolled back; the next tick retries from the same cursor.
                Err(e) => warn!(error = %e, "tick failed"),
            }
            std::thread::sleep(tick);
        }

        monitor.stop_watching();
        Ok(())
    });

    worker.await??;
    Ok(())
}

// ---------------------------------------------------------------------------
// backfill
// ---------------------------------------------------------------------------

/// Import every journal in the directory once, then exit.
pub async fn run_backfill(config: &AppConfig, args: &BackfillArgs) -> Result<(), RunError> {
    let dir = journal_dir(config)?;
    let store = open_store(config)?;
    let mut monitor = JournalMonitor::new(&dir, store, config.monitor_settings());
    let shutdown = shutdown_on_ctrl_c();
    let force_reload = args.force_reload;

    let summary = tokio::task::spawn_blocking(move || {
        backfill_blocking(&mut monitor, &shutdown, force_reload)
    })
    .await??;

    println!(
        "{} journal(s) found, {} scanned, {} entries added{}",
        summary.files_seen,
        summary.files_scanned,
        summary.entries_added,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

/// Print every tracked journal with its cursor and entry count.
pub fn run_status(config: &AppConfig) -> Result<(), RunError> {
    let store = open_store(config)?;
    let lines = status_lines(&store)?;
    if lines.is_empty() {
        println!("no journals tracked");
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn status_lines<S: JournalStore + ?Sized>(store: &S) -> Result<Vec<String>, StoreError> {
    let mut lines = Vec::new();
    for unit in store.list_units()? {
        let Some(id) = unit.id else {
            continue;
        };
        let count = store.entry_count(id)?;
        let on_disk = file_len(&unit.path());
        let state = match on_disk {
            Some(len) if len == unit.cursor => "caught up".to_string(),
            Some(len) => format!("{} bytes pending", len.saturating_sub(unit.cursor)),
            None => "missing".to_string(),
        };
        lines.push(format!(
            "{:>4}  {:<40} cursor={:<10} entries={:<6} {}",
            id, unit.name, unit.cursor, count, state
        ));
    }
    Ok(lines)
}

fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
