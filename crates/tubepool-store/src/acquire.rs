//! # Acquisition
//!
//! Ledger check, fetch into the pool, link into each interested namespace,
//! then commit to the ledger.
//!
//! A failure before the commit leaves the item unarchived, so the next run
//! fetches it again. A partially written pool file is left on disk; having
//! no namespace links, it is evicted by the next abandoned pass.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::item::{ContentItem, Subscriber};
use crate::layout::SharedPool;
use crate::ledger::ArchiveLedger;
use crate::link_strategy::{get_strategy, LinkOutcome, LinkStrategy};
use crate::{PoolError, Result};

/// Error type returned by fetch collaborators. Always treated as transient.
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// External collaborator that downloads an item into the pool.
pub trait Fetcher {
    /// Download `item` into `pool_dir` and return the final path.
    ///
    /// The fetcher picks the file name. A relative path is taken as relative
    /// to `pool_dir`.
    fn fetch(&self, item: &ContentItem, pool_dir: &Path) -> std::result::Result<PathBuf, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The ledger already holds this id; nothing was done
    AlreadyArchived,
    Archived {
        name: OsString,
        /// Subscribers that received a new link
        linked: Vec<String>,
        /// Subscribers that already had an entry with that name
        already_linked: Vec<String>,
    },
}

pub struct AcquisitionCoordinator<'a> {
    pool: &'a SharedPool,
    ledger: &'a mut ArchiveLedger,
    fetcher: &'a dyn Fetcher,
    strategy: &'a dyn LinkStrategy,
}

impl<'a> AcquisitionCoordinator<'a> {
    pub fn new(pool: &'a SharedPool, ledger: &'a mut ArchiveLedger, fetcher: &'a dyn Fetcher) -> Self {
        Self {
            pool,
            ledger,
            fetcher,
            strategy: get_strategy(),
        }
    }

    pub fn with_strategy(mut self, strategy: &'a dyn LinkStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Acquire `item` for the subscribers the interest map says follow it.
    pub fn acquire_for_interests(&mut self, item: &ContentItem) -> Result<AcquireOutcome> {
        let pool = self.pool;
        let interested = pool.interests().interested_in(item);
        self.acquire(item, &interested)
    }

    #[instrument(skip(self, item, interested), fields(id = %item.id), level = "debug")]
    pub fn acquire(&mut self, item: &ContentItem, interested: &[&Subscriber]) -> Result<AcquireOutcome> {
        info!(id = %item.id, title = %item.title, "Trying to download");

        if self.ledger.is_archived(&item.id) {
            info!(id = %item.id, "Skipping item because it's already in archive");
            return Ok(AcquireOutcome::AlreadyArchived);
        }

        let name = self.fetch(item)?;
        let entry = self
            .pool
            .store()
            .entry(&name)
            .map_err(|e| PoolError::TransientFetch {
                id: item.id.clone(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| PoolError::TransientFetch {
                id: item.id.clone(),
                reason: format!("fetched file {} is not in the pool", name.to_string_lossy()),
            })?;
        info!(id = %item.id, name = %entry.display_name(), size = entry.size, "Downloaded");

        let mut linked = Vec::new();
        let mut already_linked = Vec::new();
        for subscriber in interested {
            let ns = self.pool.layout().namespace(&subscriber.name);
            let outcome = ns
                .link(&entry, self.strategy)
                .map_err(|source| PoolError::Link {
                    subscriber: subscriber.name.clone(),
                    name: entry.display_name(),
                    source,
                })?;
            match outcome {
                LinkOutcome::Created => {
                    info!(id = %item.id, subscriber = %subscriber.name, "Linking for subscriber");
                    linked.push(subscriber.name.clone());
                }
                LinkOutcome::AlreadyPresent => {
                    debug!(id = %item.id, subscriber = %subscriber.name, "Link already present");
                    already_linked.push(subscriber.name.clone());
                }
            }
        }

        self.ledger.record(&item.id)?;
        info!(id = %item.id, "Archived");

        Ok(AcquireOutcome::Archived {
            name: entry.name,
            linked,
            already_linked,
        })
    }

    /// Run the fetcher and reduce its answer to a file name inside the pool.
    fn fetch(&self, item: &ContentItem) -> Result<OsString> {
        let pool_dir = self.pool.store().root();
        let transient = |reason: String| PoolError::TransientFetch {
            id: item.id.clone(),
            reason,
        };

        let fetched = self
            .fetcher
            .fetch(item, pool_dir)
            .map_err(|e| transient(e.to_string()))?;
        let fetched = if fetched.is_relative() {
            pool_dir.join(fetched)
        } else {
            fetched
        };

        let name = fetched
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| transient(format!("fetcher returned {} without a file name", fetched.display())))?;
        let parent = fetched
            .parent()
            .ok_or_else(|| transient(format!("fetcher returned {} without a parent", fetched.display())))?;

        let inside_pool = match (fs::canonicalize(parent), fs::canonicalize(pool_dir)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !inside_pool {
            return Err(transient(format!(
                "fetcher wrote {} outside the pool {}",
                fetched.display(),
                pool_dir.display()
            )));
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::InterestMap;
    use crate::layout::PoolLayout;
    use std::cell::Cell;
    use std::io;
    use tempfile::TempDir;

    /// Writes `<title>.mp4` into the pool and counts calls.
    struct FakeFetcher {
        calls: Cell<usize>,
        fail: bool,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
                fail: false,
            }
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, item: &ContentItem, pool_dir: &Path) -> std::result::Result<PathBuf, FetchError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err("HTTP 403".into());
            }
            let path = pool_dir.join(format!("{}.mp4", item.title));
            fs::write(&path, item.id.as_bytes())?;
            Ok(path)
        }
    }

    struct BrokenLinks;

    impl LinkStrategy for BrokenLinks {
        fn link_file(&self, _: &Path, _: &Path) -> io::Result<LinkOutcome> {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn setup() -> (TempDir, SharedPool, ArchiveLedger) {
        let temp = TempDir::new().unwrap();
        let layout = PoolLayout::new(temp.path().join("sync"), temp.path().join("archive"));
        let interests = InterestMap::new(vec![
            Subscriber::new("alice", ["UC_a"]),
            Subscriber::new("bob", ["UC_b"]),
        ]);
        let pool = SharedPool::open(layout, interests).unwrap();
        let ledger = ArchiveLedger::open(temp.path().join("archive"));
        (temp, pool, ledger)
    }

    #[test]
    fn test_second_acquire_is_noop() {
        let (_temp, pool, mut ledger) = setup();
        let fetcher = FakeFetcher::new();
        let item = ContentItem::new("id1", "First", "UC_a");

        let mut coord = AcquisitionCoordinator::new(&pool, &mut ledger, &fetcher);
        let first = coord.acquire_for_interests(&item).unwrap();
        assert!(matches!(first, AcquireOutcome::Archived { ref linked, .. } if linked == &["alice"]));
        let second = coord.acquire_for_interests(&item).unwrap();
        assert_eq!(second, AcquireOutcome::AlreadyArchived);

        assert_eq!(fetcher.calls.get(), 1);
        assert!(ledger.is_archived("id1"));
    }

    #[test]
    fn test_fetch_failure_leaves_item_unarchived() {
        let (_temp, pool, mut ledger) = setup();
        let fetcher = FakeFetcher {
            calls: Cell::new(0),
            fail: true,
        };
        let item = ContentItem::new("id2", "Broken", "UC_a");

        let err = AcquisitionCoordinator::new(&pool, &mut ledger, &fetcher)
            .acquire_for_interests(&item)
            .unwrap_err();
        assert!(matches!(err, PoolError::TransientFetch { ref reason, .. } if reason.contains("403")));
        assert!(!ledger.is_archived("id2"));
    }

    #[test]
    fn test_link_failure_keeps_pool_file_but_not_archive() {
        let (_temp, pool, mut ledger) = setup();
        let fetcher = FakeFetcher::new();
        let item = ContentItem::new("id3", "Unlinkable", "UC_b");

        let err = AcquisitionCoordinator::new(&pool, &mut ledger, &fetcher)
            .with_strategy(&BrokenLinks)
            .acquire_for_interests(&item)
            .unwrap_err();
        assert!(matches!(err, PoolError::Link { ref subscriber, .. } if subscriber == "bob"));
        assert!(err.is_transient());
        assert!(!ledger.is_archived("id3"));
        // Left for the retention pass to clean up
        assert!(pool.store().root().join("Unlinkable.mp4").exists());
    }

    #[test]
    fn test_fetch_outside_pool_rejected() {
        struct Stray(PathBuf);
        impl Fetcher for Stray {
            fn fetch(&self, _: &ContentItem, _: &Path) -> std::result::Result<PathBuf, FetchError> {
                fs::write(&self.0, b"x")?;
                Ok(self.0.clone())
            }
        }

        let (temp, pool, mut ledger) = setup();
        let fetcher = Stray(temp.path().join("elsewhere.mp4"));
        let err = AcquisitionCoordinator::new(&pool, &mut ledger, &fetcher)
            .acquire_for_interests(&ContentItem::new("id4", "x", "UC_a"))
            .unwrap_err();
        assert!(matches!(err, PoolError::TransientFetch { .. }));
    }

    #[test]
    fn test_relative_fetch_path_resolves_into_pool() {
        struct Relative;
        impl Fetcher for Relative {
            fn fetch(&self, _: &ContentItem, pool_dir: &Path) -> std::result::Result<PathBuf, FetchError> {
                fs::write(pool_dir.join("rel.mp4"), b"r")?;
                Ok(PathBuf::from("rel.mp4"))
            }
        }

        let (_temp, pool, mut ledger) = setup();
        let outcome = AcquisitionCoordinator::new(&pool, &mut ledger, &Relative)
            .acquire_for_interests(&ContentItem::new("id5", "rel", "UC_a"))
            .unwrap();
        assert!(matches!(outcome, AcquireOutcome::Archived { ref name, .. } if name == "rel.mp4"));
        assert!(pool.namespace("alice").unwrap().contains(std::ffi::OsStr::new("rel.mp4")));
    }
}
