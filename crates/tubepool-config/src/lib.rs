//! # tubepool-config
//!
//! Configuration management for tubepool.
//!
//! Loads configuration from:
//! 1. `~/.tubepool/config.toml` (global)
//! 2. `./tubepool.toml` (project-local, overrides global key by key)
//! 3. Environment variables (highest priority)
//!
//! An explicit `--config <file>` replaces steps 1 and 2.

pub mod logging;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use tubepool_store::{
    InterestMap, PoolLayout, RetentionPolicy, Subscriber, DEFAULT_CAPACITY_BYTES,
    DEFAULT_RELEVANCE_DAYS,
};

/// Project-local config file name
pub const PROJECT_CONFIG_FILE: &str = "tubepool.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub retention: RetentionConfig,
    pub fetch: FetchConfig,
    /// Subscriber interest map
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subscribers: Vec<Subscriber>,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();

        // 1. Global config (~/.tubepool/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                merge_tables(&mut merged, read_table(&global_path)?);
            }
        }

        // 2. Project config (./tubepool.toml) - overrides global
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            merge_tables(&mut merged, read_table(&project_path)?);
        }

        let mut config: Config = toml::Value::Table(merged).try_into()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load a single explicit config file, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading config from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Global config path: ~/.tubepool/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".tubepool/config.toml"))
    }

    pub fn project_config_path() -> PathBuf {
        PathBuf::from(PROJECT_CONFIG_FILE)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `TUBEPOOL_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TUBEPOOL_SYNC_ROOT") {
            self.storage.sync_root = PathBuf::from(path);
        }
        if let Some(bytes) = lookup("TUBEPOOL_CAPACITY_BYTES").and_then(|v| v.parse().ok()) {
            self.retention.capacity_bytes = bytes;
        }
        if let Some(days) = lookup("TUBEPOOL_RELEVANCE_DAYS").and_then(|v| v.parse().ok()) {
            self.retention.relevance_days = days;
        }
    }

    /// Reject configurations that must not reach the pool.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.sync_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.sync_root must not be empty".into()));
        }
        if self.storage.ledger.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.ledger must not be empty".into()));
        }
        self.layout()
            .validate(&self.interests())
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn layout(&self) -> PoolLayout {
        PoolLayout::new(
            expand_home(&self.storage.sync_root),
            expand_home(&self.storage.ledger),
        )
    }

    pub fn interests(&self) -> InterestMap {
        InterestMap::new(self.subscribers.clone())
    }

    pub fn retention_policy(&self, dry_run: bool) -> RetentionPolicy {
        RetentionPolicy {
            capacity_bytes: self.retention.capacity_bytes,
            relevance_days: self.retention.relevance_days,
            dry_run,
        }
    }

    /// Log file path, `None` when file logging is disabled
    pub fn log_file(&self) -> Option<PathBuf> {
        if self.storage.log_file.as_os_str().is_empty() {
            None
        } else {
            Some(expand_home(&self.storage.log_file))
        }
    }

    pub fn lock_file(&self) -> PathBuf {
        expand_home(&self.storage.lock_file)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds `pool/` and one directory per subscriber
    pub sync_root: PathBuf,
    /// Archive ledger file
    pub ledger: PathBuf,
    /// Run log; empty disables file logging
    pub log_file: PathBuf,
    pub lock_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sync_root: PathBuf::from("sync"),
            ledger: PathBuf::from("archive"),
            log_file: PathBuf::from("log"),
            lock_file: PathBuf::from(".tubepool.lock"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub capacity_bytes: u64,
    pub relevance_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            relevance_days: DEFAULT_RELEVANCE_DAYS,
        }
    }
}

/// External downloader invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Argv template. Placeholders: `{id}`, `{title}`, `{channel}`, `{pool}`.
    /// The last line the command prints to stdout must be the final file path.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            command: [
                "yt-dlp",
                "--no-progress",
                "--quiet",
                "-f",
                "22/best[ext=mp4]",
                "-o",
                "{pool}/%(title)s.%(ext)s",
                "--print",
                "after_move:filepath",
                "https://www.youtube.com/watch?v={id}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            timeout_secs: 3600,
        }
    }
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Recursively overlay `overlay` onto `base`; arrays and scalars are replaced.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.sync_root, PathBuf::from("sync"));
        assert_eq!(config.retention.capacity_bytes, 5 * 1024 * 1024 * 1024);
        assert_eq!(config.retention.relevance_days, 7);
        assert!(config.subscribers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[retention]"));
        assert!(toml_str.contains("[fetch]"));
        assert!(toml_str.contains("yt-dlp"));
    }

    #[test]
    fn test_toml_roundtrip_with_subscribers() {
        let mut config = Config::default();
        config.subscribers = vec![Subscriber::new("alice", ["UC1", "UC2"])];
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.subscribers, config.subscribers);
        assert_eq!(parsed.fetch.command, config.fetch.command);
    }

    #[test]
    fn test_merge_overrides_key_by_key() {
        let mut base: toml::Table = toml::from_str(
            r#"
[storage]
sync_root = "/srv/sync"
ledger = "/srv/archive"

[retention]
relevance_days = 14
"#,
        )
        .unwrap();
        let overlay: toml::Table = toml::from_str(
            r#"
[retention]
capacity_bytes = 1000
"#,
        )
        .unwrap();
        merge_tables(&mut base, overlay);
        let config: Config = toml::Value::Table(base).try_into().unwrap();

        assert_eq!(config.storage.sync_root, PathBuf::from("/srv/sync"));
        assert_eq!(config.retention.relevance_days, 14);
        assert_eq!(config.retention.capacity_bytes, 1000);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TUBEPOOL_SYNC_ROOT", "/data/sync"),
            ("TUBEPOOL_CAPACITY_BYTES", "2048"),
            ("TUBEPOOL_RELEVANCE_DAYS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.storage.sync_root, PathBuf::from("/data/sync"));
        assert_eq!(config.retention.capacity_bytes, 2048);
        // Unparseable values are ignored
        assert_eq!(config.retention.relevance_days, 7);
    }

    #[test]
    fn test_reserved_subscriber_name_invalid() {
        let mut config = Config::default();
        config.subscribers = vec![
            Subscriber::new("alice", ["UC1"]),
            Subscriber::new("pool", ["UC2"]),
        ];
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("pool")));
    }

    #[test]
    fn test_log_file_disabled_by_empty_path() {
        let mut config = Config::default();
        assert_eq!(config.log_file(), Some(PathBuf::from("log")));
        config.storage.log_file = PathBuf::new();
        assert_eq!(config.log_file(), None);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home(Path::new("/abs/path")), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/sync")), home.join("sync"));
        }
    }
}
