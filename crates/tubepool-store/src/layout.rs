//! On-disk layout and the shared pool context.
//!
//! ```text
//! <sync_root>/
//! ├── pool/                  # Pool Store
//! ├── alice/videos/          # alice's namespace (hard links into pool/)
//! └── bob/videos/
//! ```

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::item::InterestMap;
use crate::namespace::Namespace;
use crate::store::PoolStore;
use crate::{PoolError, Result};

/// Directory name of the pool inside the sync root; never a subscriber name.
pub const POOL_DIR_NAME: &str = "pool";

/// Per-subscriber directory holding namespace links
pub const NAMESPACE_DIR_NAME: &str = "videos";

#[derive(Debug, Clone)]
pub struct PoolLayout {
    sync_root: PathBuf,
    ledger_path: PathBuf,
}

impl PoolLayout {
    pub fn new(sync_root: impl Into<PathBuf>, ledger_path: impl Into<PathBuf>) -> Self {
        Self {
            sync_root: sync_root.into(),
            ledger_path: ledger_path.into(),
        }
    }

    pub fn sync_root(&self) -> &Path {
        &self.sync_root
    }

    pub fn pool_dir(&self) -> PathBuf {
        self.sync_root.join(POOL_DIR_NAME)
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    pub fn subscriber_dir(&self, subscriber: &str) -> PathBuf {
        self.sync_root.join(subscriber)
    }

    pub fn namespace(&self, subscriber: &str) -> Namespace {
        Namespace::new(
            subscriber,
            self.subscriber_dir(subscriber).join(NAMESPACE_DIR_NAME),
        )
    }

    /// Reject subscriber names that would collide with the layout.
    pub fn validate(&self, interests: &InterestMap) -> Result<()> {
        let mut seen = HashSet::new();
        for name in interests.names() {
            validate_subscriber_name(name)?;
            if !seen.insert(name) {
                return Err(PoolError::FatalConfig(format!(
                    "subscriber '{}' is listed more than once",
                    name
                )));
            }
        }
        Ok(())
    }
}

pub fn validate_subscriber_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name == POOL_DIR_NAME {
        Some("is reserved for the pool directory")
    } else if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        Some("must be a single path component")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(PoolError::FatalConfig(format!(
            "subscriber name '{}' {}",
            name, reason
        ))),
        None => Ok(()),
    }
}

/// Pool store, namespaces and interests for one run.
#[derive(Debug)]
pub struct SharedPool {
    layout: PoolLayout,
    interests: InterestMap,
    store: PoolStore,
    namespaces: Vec<Namespace>,
}

impl SharedPool {
    /// Validate the configuration, then create any missing directories.
    ///
    /// Nothing is touched on disk when validation fails.
    pub fn open(layout: PoolLayout, interests: InterestMap) -> Result<Self> {
        layout.validate(&interests)?;

        let store = PoolStore::new(layout.pool_dir())?;
        let mut namespaces = Vec::with_capacity(interests.subscribers().len());
        for name in interests.names() {
            let ns = layout.namespace(name);
            if !ns.dir().is_dir() {
                info!(subscriber = name, dir = %ns.dir().display(), "Subscriber had no namespace, creating one");
                fs::create_dir_all(ns.dir())?;
            }
            namespaces.push(ns);
        }
        info!(subscribers = ?interests.names().collect::<Vec<_>>(), "Retrieved subscribers");

        Ok(Self {
            layout,
            interests,
            store,
            namespaces,
        })
    }

    pub fn layout(&self) -> &PoolLayout {
        &self.layout
    }

    pub fn interests(&self) -> &InterestMap {
        &self.interests
    }

    pub fn store(&self) -> &PoolStore {
        &self.store
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    pub fn namespace(&self, subscriber: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.subscriber() == subscriber)
    }

    /// Remove `name` from every namespace, then from the pool.
    ///
    /// Missing namespace entries are fine. A namespace entry that cannot be
    /// removed is logged and left dangling; the next orphan sweep retries it.
    /// Only a failure to remove the pool file is returned.
    pub fn delete_everywhere(&self, name: &OsStr) -> io::Result<()> {
        for ns in &self.namespaces {
            if let Err(e) = ns.remove(name) {
                warn!(
                    subscriber = ns.subscriber(),
                    name = %name.to_string_lossy(),
                    error = %e,
                    "Could not remove namespace entry"
                );
            }
        }
        self.store.remove(name)
    }
}
