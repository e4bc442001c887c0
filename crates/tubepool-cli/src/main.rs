//! # tubepool CLI
//!
//! Fetches items once into a shared pool, hard-links them into every
//! interested subscriber's namespace, and reclaims pool space.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::field::display;
use tubepool_config::logging::{init_logging, LogLevel};
use tubepool_config::{log_run_error, log_run_info, log_run_warn, Config};
use tubepool_store::{
    run_once, ArchiveLedger, RetentionManager, RunLock, SharedPool, DEFAULT_LOCK_TIMEOUT_SECS,
};

mod config_cmd;
mod fetch;
mod report;
mod status;
mod worklist;

use config_cmd::ConfigCommands;
use fetch::CommandFetcher;

/// tubepool - fetch once, share with every subscriber
#[derive(Parser)]
#[command(name = "tubepool")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file; replaces ~/.tubepool/config.toml and ./tubepool.toml
    #[arg(long, global = true, env = "TUBEPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// Sync root directory (overrides storage.sync_root)
    #[arg(long, global = true)]
    sync_root: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reclaim space, then fetch and distribute every worklist item
    Run {
        /// JSON array of items: [{"id", "title", "channel"}]
        #[arg(short, long, value_name = "FILE")]
        worklist: PathBuf,

        /// Report retention deletions without performing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the retention passes only
    Reclaim {
        #[arg(long)]
        dry_run: bool,
    },

    /// Display pool usage, subscriber links and ledger size
    Status,

    /// Inspect or create configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    if let Some(root) = cli.sync_root {
        config.storage.sync_root = root;
    }

    // Invalid configuration is fatal before anything on disk is touched,
    // the log file included.
    let checked = match cli.command {
        Commands::Config { .. } => Ok(()),
        _ => config.validate(),
    };

    // Only mutating commands append to the run log
    let log_file = match cli.command {
        Commands::Run { .. } | Commands::Reclaim { .. } if checked.is_ok() => config.log_file(),
        _ => None,
    };
    init_logging(LogLevel::from_verbosity(cli.verbose), log_file.as_deref())
        .context("Failed to open log file")?;

    if let Err(e) = checked {
        log_run_error!("Invalid configuration", error = display(&e));
        return Err(e.into());
    }

    match cli.command {
        Commands::Config { command } => config_cmd::run(command, &config, cli.config.as_deref()),
        Commands::Status => status::run(&config),
        Commands::Run { worklist, dry_run } => cmd_run(&config, &worklist, dry_run),
        Commands::Reclaim { dry_run } => cmd_reclaim(&config, dry_run),
    }
}

fn lock(config: &Config) -> Result<RunLock> {
    let path = config.lock_file();
    RunLock::acquire(&path, Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS))
        .with_context(|| format!("Failed to acquire run lock {}", path.display()))
}

fn cmd_run(config: &Config, worklist_path: &Path, dry_run: bool) -> Result<()> {
    let items = worklist::load(worklist_path)?;
    let fetcher = CommandFetcher::from_config(&config.fetch)?;

    let _lock = lock(config)?;
    let pool = SharedPool::open(config.layout(), config.interests())?;
    let mut ledger = ArchiveLedger::open(pool.layout().ledger_path());
    log_run_info!(
        "Worklist loaded",
        items = items.len(),
        archived = ledger.len(),
        dry_run = dry_run
    );

    let report = run_once(
        &pool,
        &mut ledger,
        &fetcher,
        items,
        config.retention_policy(dry_run),
    )
    .map_err(|e| {
        log_run_error!("Run aborted", error = display(&e));
        anyhow::Error::new(e)
    })?;

    if !report.failed.is_empty() {
        log_run_warn!(
            "Items failed and stay unarchived until the next run",
            failed = report.failed.len()
        );
    }
    report::print_run(&report);
    Ok(())
}

fn cmd_reclaim(config: &Config, dry_run: bool) -> Result<()> {
    let _lock = lock(config)?;
    let pool = SharedPool::open(config.layout(), config.interests())?;

    let report = RetentionManager::new(&pool, config.retention_policy(dry_run))
        .reclaim()
        .map_err(|e| {
            log_run_error!("Retention aborted", error = display(&e));
            anyhow::Error::new(e)
        })?;

    report::print_reclaim(&report);
    Ok(())
}
