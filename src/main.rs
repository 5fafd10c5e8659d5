use clap::Parser;
use journal_monitor::cli::{Cli, Commands};
use journal_monitor::config::build_config;
use journal_monitor::runner;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "journal_monitor=info";
const VERBOSE_FILTER: &str = "journal_monitor=debug";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG always wins; otherwise the filter is widened once the
    // config file has been read, since it may turn on `verbose`.
    let from_env = EnvFilter::try_from_default_env().ok();
    let env_set = from_env.is_some();
    let initial = from_env.unwrap_or_else(|| {
        EnvFilter::new(if cli.verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
    });
    let (filter, filter_handle) = reload::Layer::new(initial);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let app_config = build_config(&cli);
    if app_config.verbose && !env_set && !cli.verbose {
        let _ = filter_handle.modify(|f| *f = EnvFilter::new(VERBOSE_FILTER));
    }
    tracing::debug!(config = ?app_config, "effective config");

    let result = match cli.command {
        Commands::Watch(ref args) => runner::run_watch(&app_config, args).await,
        Commands::Backfill(ref args) => runner::run_backfill(&app_config, args).await,
        Commands::Status => runner::run_status(&app_config),
    };

    if let Err(e) = result {
        let mode = match cli.command {
            Commands::Watch(_) => "watch",
            Commands::Backfill(_) => "backfill",
            Commands::Status => "status",
        };
        eprintln!("journal-monitor: {}: {}", mode, e);
        std::process::exit(1);
    }
}
