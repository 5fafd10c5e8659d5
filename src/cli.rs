use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Tail a directory of journal files into a durable event store
#[derive(Parser, Debug)]
#[command(
    name = "journal-monitor",
    about = "Tail a directory of journal files into a durable event store"
)]
pub struct Cli {
    /// Path to the SQLite database holding tracked journals and entries.
    /// Default: <data dir>/journal-monitor/journal.db
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Show debug output (overridden by RUST_LOG)
    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    /// Path to config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Live-tail the journal directory until interrupted
    Watch(WatchArgs),
    /// Import every journal in the directory, then exit
    Backfill(BackfillArgs),
    /// List tracked journals with their cursors and entry counts
    Status,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Journal directory to watch
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Run a full backfill before live tailing
    #[arg(long, default_value_t = false)]
    pub backfill: bool,

    /// With --backfill, re-read every journal from the start
    #[arg(long, default_value_t = false, requires = "backfill")]
    pub force_reload: bool,
}

#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// Journal directory to import
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Re-read every journal from the start
    #[arg(long, default_value_t = false)]
    pub force_reload: bool,
}

impl Commands {
    /// The `--dir` given to the subcommand, if any.
    pub fn dir(&self) -> Option<&PathBuf> {
        match self {
            Commands::Watch(args) => args.dir.as_ref(),
            Commands::Backfill(args) => args.dir.as_ref(),
            Commands::Status => None,
        }
    }
}
