//! # Retention
//!
//! Reclaims pool space in three ordered passes:
//!
//! 1. **abandoned**: pool files no subscriber namespace references any more
//!    (same-file identity, so renamed links still count). Namespace entries
//!    with no pool file behind them are swept in the same pass.
//! 2. **aged-out**: pool files whose modification date is more than
//!    `relevance_days` before today.
//! 3. **over-capacity**: oldest pool files until the pool fits in
//!    `capacity_bytes`.
//!
//! Every pass works on a snapshot taken at its start and uses filesystem
//! state only; the archive ledger is never consulted. Acquisition must not
//! run concurrently (see [`crate::RunLock`]).

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDate};
use tracing::{error, info, warn};

use crate::layout::SharedPool;
use crate::store::{FileIdentity, PoolEntry};
use crate::{format_bytes, PoolError, Result};

/// 5 GiB
pub const DEFAULT_CAPACITY_BYTES: u64 = 5 * 1024 * 1024 * 1024;
pub const DEFAULT_RELEVANCE_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub capacity_bytes: u64,
    /// Oldest an item may be, in days, and still be kept
    pub relevance_days: u32,
    /// Report what would be deleted without touching the filesystem
    pub dry_run: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            relevance_days: DEFAULT_RELEVANCE_DAYS,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Every subscriber removed their link
    Abandoned,
    /// Namespace entry whose pool file no longer exists
    Orphaned,
    AgedOut,
    OverCapacity,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvictionReason::Abandoned => "abandoned",
            EvictionReason::Orphaned => "orphaned",
            EvictionReason::AgedOut => "aged-out",
            EvictionReason::OverCapacity => "over-capacity",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub name: OsString,
    pub reason: EvictionReason,
    /// Set for orphaned namespace entries, which belong to one subscriber
    pub subscriber: Option<String>,
    /// Pool size after this deletion (over-capacity pass only)
    pub pool_bytes_after: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionFailure {
    pub name: OsString,
    pub reason: EvictionReason,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReclaimReport {
    pub deletions: Vec<Deletion>,
    pub failures: Vec<DeletionFailure>,
    /// Measured pool size once all passes finished
    pub final_bytes: u64,
    pub dry_run: bool,
}

impl ReclaimReport {
    pub fn count(&self, reason: EvictionReason) -> usize {
        self.deletions.iter().filter(|d| d.reason == reason).count()
    }

    /// Pool file names removed for `reason`, in deletion order.
    pub fn names(&self, reason: EvictionReason) -> Vec<&OsString> {
        self.deletions
            .iter()
            .filter(|d| d.reason == reason)
            .map(|d| &d.name)
            .collect()
    }
}

/// Bookkeeping shared by the passes of one reclaim.
#[derive(Default)]
struct Sweep {
    report: ReclaimReport,
    /// Pool entries already evicted (or planned, in dry-run) with their size
    removed: HashMap<OsString, u64>,
}

pub struct RetentionManager<'a> {
    pool: &'a SharedPool,
    policy: RetentionPolicy,
}

impl<'a> RetentionManager<'a> {
    pub fn new(pool: &'a SharedPool, policy: RetentionPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Run all passes with today's local date.
    pub fn reclaim(&self) -> Result<ReclaimReport> {
        self.reclaim_on(Local::now().date_naive())
    }

    /// Run all passes, computing ages relative to `today`.
    pub fn reclaim_on(&self, today: NaiveDate) -> Result<ReclaimReport> {
        info!(
            pool = %self.pool.store().root().display(),
            capacity = %format_bytes(self.policy.capacity_bytes),
            relevance_days = self.policy.relevance_days,
            dry_run = self.policy.dry_run,
            "Cleaning the pool"
        );

        let mut sweep = Sweep::default();
        sweep.report.dry_run = self.policy.dry_run;

        self.pass_abandoned(&mut sweep)?;
        self.pass_aged_out(&mut sweep, today)?;
        self.pass_over_capacity(&mut sweep)?;

        info!(
            deleted = sweep.report.deletions.len(),
            failed = sweep.report.failures.len(),
            pool_size = %format_bytes(sweep.report.final_bytes),
            "The pool is clean"
        );
        Ok(sweep.report)
    }

    /// Entries still present in the pool, minus those already evicted.
    fn remaining(&self, sweep: &Sweep) -> Result<Vec<PoolEntry>> {
        Ok(self
            .pool
            .store()
            .entries()?
            .into_iter()
            .filter(|e| !sweep.removed.contains_key(&e.name))
            .collect())
    }

    fn pass_abandoned(&self, sweep: &mut Sweep) -> Result<()> {
        let entries = self.remaining(sweep)?;

        // An unreadable namespace might hold the only link to an entry, so
        // abandonment cannot be decided until every namespace was read.
        let mut referenced: HashSet<FileIdentity> = HashSet::new();
        let mut complete = true;
        for ns in self.pool.namespaces() {
            match ns.identities() {
                Ok(ids) => referenced.extend(ids),
                Err(e) => {
                    error!(subscriber = ns.subscriber(), error = %e, "Could not read subscriber namespace");
                    complete = false;
                }
            }
        }

        if complete {
            for entry in entries.iter().filter(|e| !referenced.contains(&e.identity)) {
                if self.evict(sweep, entry, EvictionReason::Abandoned) {
                    warn!(name = %entry.display_name(), reason = %EvictionReason::Abandoned, "Deleted from pool. Reason: deleted by all subscribers");
                    sweep.report.deletions.push(Deletion {
                        name: entry.name.clone(),
                        reason: EvictionReason::Abandoned,
                        subscriber: None,
                        pool_bytes_after: None,
                    });
                }
            }
        } else {
            warn!("Skipping abandoned pass: not every namespace could be read");
        }

        let kept: Vec<&PoolEntry> = entries
            .iter()
            .filter(|e| !sweep.removed.contains_key(&e.name))
            .collect();
        self.sweep_orphans(sweep, &kept);
        Ok(())
    }

    /// Remove namespace entries backed by no pool file, by name or by identity.
    fn sweep_orphans(&self, sweep: &mut Sweep, kept: &[&PoolEntry]) {
        let pool_names: HashSet<&OsString> = kept.iter().map(|e| &e.name).collect();
        let pool_ids: HashSet<FileIdentity> = kept.iter().map(|e| e.identity).collect();

        for ns in self.pool.namespaces() {
            let names = match ns.entries() {
                Ok(names) => names,
                Err(_) => continue, // already reported by the abandoned pass
            };
            for name in names {
                if pool_names.contains(&name) || sweep.removed.contains_key(&name) {
                    continue;
                }
                match FileIdentity::from_path(&ns.path_of(&name)) {
                    // Renamed link
                    Ok(id) if pool_ids.contains(&id) => continue,
                    Ok(_) => {}
                    // Gone since the listing
                    Err(_) => continue,
                }
                if !self.policy.dry_run {
                    if let Err(e) = ns.remove(&name) {
                        warn!(subscriber = ns.subscriber(), name = %name.to_string_lossy(), error = %e, "Could not remove orphaned namespace entry");
                        sweep.report.failures.push(DeletionFailure {
                            name,
                            reason: EvictionReason::Orphaned,
                            error: e.to_string(),
                        });
                        continue;
                    }
                }
                warn!(subscriber = ns.subscriber(), name = %name.to_string_lossy(), reason = %EvictionReason::Orphaned, "Deleted from namespace. Reason: no longer in pool");
                sweep.report.deletions.push(Deletion {
                    name,
                    reason: EvictionReason::Orphaned,
                    subscriber: Some(ns.subscriber().to_string()),
                    pool_bytes_after: None,
                });
            }
        }
    }

    fn pass_aged_out(&self, sweep: &mut Sweep, today: NaiveDate) -> Result<()> {
        let window = i64::from(self.policy.relevance_days);
        for entry in self.remaining(sweep)? {
            let age = age_in_days(entry.modified, today);
            if age <= window {
                continue;
            }
            if self.evict(sweep, &entry, EvictionReason::AgedOut) {
                warn!(name = %entry.display_name(), reason = %EvictionReason::AgedOut, age_days = age, "Deleted from pool. Reason: too old");
                sweep.report.deletions.push(Deletion {
                    name: entry.name.clone(),
                    reason: EvictionReason::AgedOut,
                    subscriber: None,
                    pool_bytes_after: None,
                });
            }
        }
        Ok(())
    }

    fn pass_over_capacity(&self, sweep: &mut Sweep) -> Result<()> {
        let capacity = self.policy.capacity_bytes;
        let measured = self.pool.store().total_bytes()?;
        // In dry-run the earlier passes' files are still on disk
        let mut total = if self.policy.dry_run {
            measured.saturating_sub(sweep.removed.values().sum())
        } else {
            measured
        };

        if total > capacity {
            let mut candidates = self.remaining(sweep)?;
            candidates.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
            let mut candidates = candidates.into_iter();

            while total > capacity {
                let Some(entry) = candidates.next() else {
                    error!(
                        pool_size = total,
                        capacity,
                        "Pool is over capacity but no deletable entry is left"
                    );
                    return Err(PoolError::CapacityStalled {
                        total_bytes: total,
                        capacity_bytes: capacity,
                    });
                };
                if !self.evict(sweep, &entry, EvictionReason::OverCapacity) {
                    continue;
                }
                total = total.saturating_sub(entry.size);
                warn!(
                    name = %entry.display_name(),
                    reason = %EvictionReason::OverCapacity,
                    pool_size = %format_bytes(total),
                    limit = %format_bytes(capacity),
                    "Deleted from pool. Reason: pool size exceeded the limit"
                );
                sweep.report.deletions.push(Deletion {
                    name: entry.name.clone(),
                    reason: EvictionReason::OverCapacity,
                    subscriber: None,
                    pool_bytes_after: Some(total),
                });
            }
        }

        sweep.report.final_bytes = total;
        Ok(())
    }

    /// Delete `entry` everywhere (unless dry-run). False when deletion failed.
    fn evict(&self, sweep: &mut Sweep, entry: &PoolEntry, reason: EvictionReason) -> bool {
        if !self.policy.dry_run {
            if let Err(e) = self.pool.delete_everywhere(&entry.name) {
                warn!(name = %entry.display_name(), reason = %reason, error = %e, "Could not delete pool entry, skipping");
                sweep.report.failures.push(DeletionFailure {
                    name: entry.name.clone(),
                    reason,
                    error: e.to_string(),
                });
                return false;
            }
        }
        sweep.removed.insert(entry.name.clone(), entry.size);
        true
    }
}

/// Whole days between the local date of `modified` and `today`.
pub fn age_in_days(modified: SystemTime, today: NaiveDate) -> i64 {
    let modified: DateTime<Local> = modified.into();
    (today - modified.date_naive()).num_days()
}
