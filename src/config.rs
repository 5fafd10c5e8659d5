use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::cli::Cli;
use crate::merge::RetryPolicy;
use crate::scheduler::{MonitorSettings, DEFAULT_IDLE_THRESHOLD};

// ---------------------------------------------------------------------------
// TOML-deserializable config (intermediate representation)
// ---------------------------------------------------------------------------

/// Raw config as parsed from the TOML file.
/// All fields are optional so that missing keys fall through to defaults.
/// Unknown keys are silently ignored by serde.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    journal_dir: Option<PathBuf>,
    database: Option<PathBuf>,
    verbose: Option<bool>,
    scan: FileScanConfig,
    merge: FileMergeConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileScanConfig {
    tick_interval_ms: Option<u64>,
    idle_threshold: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileMergeConfig {
    retry_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Effective (merged) config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub journal_dir: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub verbose: bool,
    pub scan: ScanConfig,
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub tick_interval: Duration,
    pub idle_threshold: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            journal_dir: None,
            database: default_database_path(),
            verbose: false,
            scan: ScanConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            retry_attempts: policy.attempts,
            retry_delay: policy.delay,
        }
    }
}

impl AppConfig {
    /// The engine-facing subset of the configuration.
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            idle_threshold: self.scan.idle_threshold,
            merge_retry: RetryPolicy {
                attempts: self.merge.retry_attempts,
                delay: self.merge.retry_delay,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Returns the default config file path: `~/.config/journal-monitor/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("journal-monitor").join("config.toml"))
}

/// Returns the default database path: `<data dir>/journal-monitor/journal.db`
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("journal-monitor").join("journal.db"))
}

/// Load the config file from the given path.
/// Returns the parsed `FileConfig`, or `None` if the file does not exist
/// or cannot be parsed.
fn load_file_config(path: &Path) -> Option<FileConfig> {
    if !path.exists() {
        return None;
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<FileConfig>(&contents) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse config file");
                None
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read config file");
            None
        }
    }
}

/// Build the effective `AppConfig` by merging defaults, config file, and CLI args.
///
/// Precedence (highest wins):
/// 1. CLI flags (if explicitly provided)
/// 2. Config file values
/// 3. Hardcoded defaults
pub fn build_config(cli: &Cli) -> AppConfig {
    let mut config = AppConfig::default();

    let config_path = cli.config.clone().or_else(default_config_path);

    if let Some(ref path) = config_path {
        if let Some(file_cfg) = load_file_config(path) {
            apply_file_config(&mut config, file_cfg);
        } else if cli.config.is_some() && !path.exists() {
            warn!(path = %path.display(), "config file not found");
        }
    }

    if let Some(dir) = cli.command.dir() {
        config.journal_dir = Some(dir.clone());
    }
    if cli.db.is_some() {
        config.database = cli.db.clone();
    }
    if cli.verbose {
        config.verbose = true;
    }

    config
}

fn apply_file_config(config: &mut AppConfig, file_cfg: FileConfig) {
    if file_cfg.journal_dir.is_some() {
        config.journal_dir = file_cfg.journal_dir;
    }
    if file_cfg.database.is_some() {
        config.database = file_cfg.database;
    }
    if let Some(v) = file_cfg.verbose {
        config.verbose = v;
    }
    if let Some(ms) = file_cfg.scan.tick_interval_ms {
        config.scan.tick_interval = Duration::from_millis(ms.max(1));
    }
    if let Some(n) = file_cfg.scan.idle_threshold {
        config.scan.idle_threshold = n;
    }
    if let Some(n) = file_cfg.merge.retry_attempts {
        config.merge.retry_attempts = n.max(1);
    }
    if let Some(ms) = file_cfg.merge.retry_delay_ms {
        config.merge.retry_delay = Duration::from_millis(ms);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
