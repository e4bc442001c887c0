//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated sync root and archive ledger
//! - A `tubepool.toml` describing the subscribers
//! - Pool files and namespace links set up by hand
//!
//! # Usage
//!
//! ```ignore
//! use tubepool_config::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new()?;
//! let config = env.config(vec![Subscriber::new("alice", ["UC1"])]);
//! env.create_pool_file("X.mp4", b"video")?;
//! env.link("alice", "X.mp4")?;
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use tempfile::TempDir;
use tubepool_store::{Subscriber, NAMESPACE_DIR_NAME, POOL_DIR_NAME};

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with its own sync root
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Working directory for the test; holds the config file
    pub root: PathBuf,
    pub sync_root: PathBuf,
    pub ledger_path: PathBuf,
    pub log_path: PathBuf,
    pub lock_path: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join(format!("tubepool-test-{}", test_id));
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            sync_root: root.join("sync"),
            ledger_path: root.join("archive"),
            log_path: root.join("log"),
            lock_path: root.join(".tubepool.lock"),
            root,
            _temp_dir: temp_dir,
            test_id,
        })
    }

    /// Config pointing every storage path into this environment
    pub fn config(&self, subscribers: Vec<Subscriber>) -> Config {
        let mut cfg = Config::default();
        cfg.storage.sync_root = self.sync_root.clone();
        cfg.storage.ledger = self.ledger_path.clone();
        cfg.storage.log_file = self.log_path.clone();
        cfg.storage.lock_file = self.lock_path.clone();
        cfg.subscribers = subscribers;
        cfg
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(crate::PROJECT_CONFIG_FILE)
    }

    /// Write `config` as `tubepool.toml` in the environment root
    pub fn write_config(&self, config: &Config) -> anyhow::Result<PathBuf> {
        let path = self.config_path();
        std::fs::write(&path, toml::to_string_pretty(config)?)?;
        Ok(path)
    }

    pub fn pool_dir(&self) -> PathBuf {
        self.sync_root.join(POOL_DIR_NAME)
    }

    pub fn namespace_dir(&self, subscriber: &str) -> PathBuf {
        self.sync_root.join(subscriber).join(NAMESPACE_DIR_NAME)
    }

    /// Create a pool file with content
    pub fn create_pool_file(&self, name: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let dir = self.pool_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Hard-link an existing pool file into a subscriber's namespace
    pub fn link(&self, subscriber: &str, name: &str) -> anyhow::Result<PathBuf> {
        let dir = self.namespace_dir(subscriber);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        std::fs::hard_link(self.pool_dir().join(name), &path)?;
        Ok(path)
    }

    /// Ledger lines as written on disk
    pub fn ledger_ids(&self) -> anyhow::Result<Vec<String>> {
        if !self.ledger_path.exists() {
            return Ok(Vec::new());
        }
        Ok(std::fs::read_to_string(&self.ledger_path)?
            .lines()
            .map(str::to_string)
            .collect())
    }
}
