//! `tubepool status`: pool usage, per-subscriber links and ledger size.
//!
//! Read-only. A sync root that was never prepared is reported, not created.

use std::collections::HashSet;

use anyhow::Result;
use console::style;
use tubepool_config::Config;
use tubepool_store::{format_bytes, ArchiveLedger, PoolStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberStatus {
    pub name: String,
    pub entries: usize,
    /// Entries that share an identity with a pool file
    pub linked: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub initialized: bool,
    pub pool_entries: u64,
    pub pool_bytes: u64,
    pub capacity_bytes: u64,
    pub subscribers: Vec<SubscriberStatus>,
    pub archived: usize,
}

pub fn collect(config: &Config) -> Result<StatusReport> {
    let layout = config.layout();
    let ledger_path = layout.ledger_path();
    let archived = if ledger_path.exists() {
        ArchiveLedger::open(ledger_path).len()
    } else {
        0
    };

    let mut report = StatusReport {
        initialized: layout.pool_dir().is_dir(),
        pool_entries: 0,
        pool_bytes: 0,
        capacity_bytes: config.retention.capacity_bytes,
        subscribers: Vec::new(),
        archived,
    };
    if !report.initialized {
        return Ok(report);
    }

    let store = PoolStore::new(layout.pool_dir())?;
    let stats = store.stats()?;
    report.pool_entries = stats.entry_count;
    report.pool_bytes = stats.total_bytes;
    let pool_ids: HashSet<_> = store.entries()?.into_iter().map(|e| e.identity).collect();

    for subscriber in &config.subscribers {
        let ns = layout.namespace(&subscriber.name);
        let identities = ns.identities()?;
        report.subscribers.push(SubscriberStatus {
            name: subscriber.name.clone(),
            entries: ns.entries()?.len(),
            linked: identities.intersection(&pool_ids).count(),
        });
    }
    Ok(report)
}

pub fn run(config: &Config) -> Result<()> {
    let report = collect(config)?;

    println!();
    println!("  {}", style("tubepool status").bold());
    println!("  Sync root: {}", config.layout().sync_root().display());

    if !report.initialized {
        println!();
        println!(
            "  {} Pool not initialized yet. Run {} first.",
            style("!").yellow(),
            style("tubepool run").cyan()
        );
        return Ok(());
    }

    let usage = style(format!(
        "{} / {}",
        format_bytes(report.pool_bytes),
        format_bytes(report.capacity_bytes)
    ));
    let usage = if report.pool_bytes > report.capacity_bytes {
        usage.red()
    } else {
        usage.green()
    };
    println!();
    println!("  Pool:      {} entries, {}", report.pool_entries, usage);
    println!("  Archived:  {} items", report.archived);

    println!();
    println!("  Subscribers:");
    for sub in &report.subscribers {
        let dangling = sub.entries.saturating_sub(sub.linked);
        if dangling > 0 {
            println!(
                "    {:<16} {} links, {}",
                sub.name,
                sub.linked,
                style(format!("{} not in pool", dangling)).yellow()
            );
        } else {
            println!("    {:<16} {} links", sub.name, sub.linked);
        }
    }
    Ok(())
}
