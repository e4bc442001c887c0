//! Namespace link strategy
//!
//! Materializes a pool file into a subscriber namespace.
//!
//! # Design
//!
//! Retention detects abandoned pool files by comparing file identity
//! (device + inode), so every namespace entry must share the pool file's
//! inode. Reflink and copy fallbacks would produce a new inode and make the
//! entry invisible to that check, so they are not offered here.

use std::fs;
use std::io;
use std::path::Path;

/// Result of a single link attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// A new namespace entry was created
    Created,
    /// An entry with that name already existed and was left alone
    AlreadyPresent,
}

/// File linking strategy for subscriber namespaces
pub trait LinkStrategy: Send + Sync {
    /// Create `target` as a reference to the same storage object as `source`.
    ///
    /// An existing `target` is not an error and is never replaced.
    fn link_file(&self, source: &Path, target: &Path) -> io::Result<LinkOutcome>;

    /// Name of this strategy (for logging/debugging)
    fn name(&self) -> &'static str;
}

/// Plain hard links. Pool and namespaces must live on the same filesystem.
pub struct HardLinkStrategy;

impl LinkStrategy for HardLinkStrategy {
    fn link_file(&self, source: &Path, target: &Path) -> io::Result<LinkOutcome> {
        match fs::hard_link(source, target) {
            Ok(()) => Ok(LinkOutcome::Created),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(LinkOutcome::AlreadyPresent),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => Err(io::Error::new(
                io::ErrorKind::CrossesDevices,
                format!(
                    "pool and namespace are on different filesystems ({} -> {})",
                    source.display(),
                    target.display()
                ),
            )),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &'static str {
        "hardlink"
    }
}

/// Get the default LinkStrategy
pub fn get_strategy() -> &'static dyn LinkStrategy {
    static STRATEGY: HardLinkStrategy = HardLinkStrategy;
    &STRATEGY
}
