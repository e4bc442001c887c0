//! # tubepool-store
//!
//! Shared content pool for tubepool.
//!
//! Each fetched item is stored once in the pool and hard-linked into the
//! namespace of every interested subscriber. An append-only archive ledger
//! guarantees an item is fetched and distributed at most once, and a
//! three-pass retention policy reclaims space while keeping namespaces in
//! sync with the pool.
//!
//! ## Directory Layout
//!
//! ```text
//! <sync_root>/
//! ├── pool/
//! │   └── Title.mp4          # one physical copy
//! ├── alice/videos/
//! │   └── Title.mp4          # same inode as pool/Title.mp4
//! └── bob/videos/
//! archive                    # one content id per line
//! ```
//!
//! Unix only: namespace entries are identified by device and inode.

mod error;

pub mod acquire;
pub mod item;
pub mod layout;
pub mod ledger;
pub mod link_strategy;
pub mod namespace;
pub mod retention;
pub mod run;
pub mod store;

pub use acquire::{AcquireOutcome, AcquisitionCoordinator, FetchError, Fetcher};
pub use error::{PoolError, Result};
pub use item::{ContentItem, InterestMap, Subscriber};
pub use layout::{PoolLayout, SharedPool, NAMESPACE_DIR_NAME, POOL_DIR_NAME};
pub use ledger::{is_valid_id, ArchiveLedger};
pub use link_strategy::{get_strategy, HardLinkStrategy, LinkOutcome, LinkStrategy};
pub use namespace::Namespace;
pub use retention::{
    Deletion, DeletionFailure, EvictionReason, ReclaimReport, RetentionManager, RetentionPolicy,
    DEFAULT_CAPACITY_BYTES, DEFAULT_RELEVANCE_DAYS,
};
pub use run::{run_once, RunLock, RunReport, DEFAULT_LOCK_TIMEOUT_SECS};
pub use store::{FileIdentity, PoolEntry, PoolStats, PoolStore};

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
