//! One run: retention first, then acquisition of every worklist item.
//!
//! Concurrent runs are not supported. [`RunLock`] serializes them, and within
//! a run the retention and acquisition phases never interleave.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{error, info, warn};

use crate::acquire::{AcquireOutcome, AcquisitionCoordinator, Fetcher};
use crate::item::ContentItem;
use crate::layout::SharedPool;
use crate::ledger::ArchiveLedger;
use crate::retention::{ReclaimReport, RetentionManager, RetentionPolicy};
use crate::{PoolError, Result};

/// Default lock timeout in seconds
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

/// Exclusive run-level lock, released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock at `path`, polling until `timeout` elapses.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= timeout {
                        return Err(PoolError::Lock(format!(
                            "timeout waiting for {} after {}s, another run may be in progress",
                            path.display(),
                            timeout.as_secs()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub reclaim: ReclaimReport,
    pub archived: Vec<String>,
    /// Already in the ledger
    pub skipped: Vec<String>,
    /// (content id, reason)
    pub failed: Vec<(String, String)>,
    pub elapsed: Duration,
}

/// Reclaim pool space, then acquire every item in order.
///
/// Per-item failures are recorded and the run moves on. Fatal errors
/// (stalled capacity pass, I/O on the pool itself) abort the run.
pub fn run_once<I>(
    pool: &SharedPool,
    ledger: &mut ArchiveLedger,
    fetcher: &dyn Fetcher,
    items: I,
    policy: RetentionPolicy,
) -> Result<RunReport>
where
    I: IntoIterator<Item = ContentItem>,
{
    let start = Instant::now();
    info!(sync_root = %pool.layout().sync_root().display(), "Starting run");

    let mut report = RunReport {
        reclaim: RetentionManager::new(pool, policy).reclaim()?,
        ..RunReport::default()
    };

    let mut coordinator = AcquisitionCoordinator::new(pool, ledger, fetcher);
    for item in items {
        match coordinator.acquire_for_interests(&item) {
            Ok(AcquireOutcome::Archived { .. }) => report.archived.push(item.id),
            Ok(AcquireOutcome::AlreadyArchived) => report.skipped.push(item.id),
            Err(e) if e.is_transient() => {
                error!(id = %item.id, title = %item.title, error = %e, "Download error. Not archived; will try next run");
                report.failed.push((item.id, e.to_string()));
            }
            Err(e) => {
                error!(id = %item.id, error = %e, "Aborting run");
                return Err(e);
            }
        }
    }

    report.elapsed = start.elapsed();
    if report.failed.is_empty() {
        info!(
            archived = report.archived.len(),
            skipped = report.skipped.len(),
            elapsed = ?report.elapsed,
            "Run ended"
        );
    } else {
        warn!(
            archived = report.archived.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            elapsed = ?report.elapsed,
            "Run ended with failed items"
        );
    }
    Ok(report)
}
