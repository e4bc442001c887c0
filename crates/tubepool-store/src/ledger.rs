//! # Archive Ledger
//!
//! Append-only record of content identifiers that completed a full
//! acquisition. One identifier per line.
//!
//! Membership is monotonic: an identifier stays archived after its pool
//! file is evicted, which is what stops the pool from re-fetching content
//! that was already distributed and cleaned up.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::{PoolError, Result};

#[derive(Debug)]
pub struct ArchiveLedger {
    path: PathBuf,
    ids: HashSet<String>,
}

impl ArchiveLedger {
    /// Open the ledger at `path`.
    ///
    /// A missing ledger is created empty. An unreadable one is treated as
    /// empty. Both cases are logged since already-distributed content may be
    /// fetched again.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let ids = match fs::read(&path) {
            Ok(bytes) => parse_ids(&String::from_utf8_lossy(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(ledger = %path.display(), "No archive ledger found, creating a new one");
                if let Err(e) = create_empty(&path) {
                    warn!(ledger = %path.display(), error = %e, "Could not create archive ledger");
                }
                HashSet::new()
            }
            Err(e) => {
                warn!(
                    ledger = %path.display(),
                    error = %e,
                    "Archive ledger unreadable, treating every item as not archived"
                );
                HashSet::new()
            }
        };
        debug!(ledger = %path.display(), entries = ids.len(), "Archive ledger loaded");
        Self { path, ids }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_archived(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Durably append `id`.
    ///
    /// Callers check [`is_archived`](Self::is_archived) first; the file is
    /// not deduplicated.
    pub fn record(&mut self, id: &str) -> Result<()> {
        self.append(id).map_err(|source| PoolError::LedgerWrite {
            id: id.to_string(),
            source,
        })?;
        self.ids.insert(id.to_string());
        Ok(())
    }

    fn append(&self, id: &str) -> io::Result<()> {
        if !is_valid_id(id) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("content identifier {:?} must be a single non-blank line without surrounding whitespace", id),
            ));
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let written = terminate_last_line(&mut file)
            .and_then(|()| writeln!(file, "{}", id))
            .and_then(|()| file.sync_data());
        let unlocked = FileExt::unlock(&file);
        written?;
        unlocked
    }

    /// Number of distinct archived identifiers
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Whether `id` survives a write and re-read of the ledger unchanged.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.trim() == id && !id.contains(['\n', '\r'])
}

fn parse_ids(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// A hand edit or an interrupted append can leave the last line open.
fn terminate_last_line(file: &mut File) -> io::Result<()> {
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
    }
    Ok(())
}

fn create_empty(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(path).map(drop)
}
