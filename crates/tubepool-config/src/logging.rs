//! Structured logging for tubepool.
//!
//! Every run writes a textual log: to stderr, and appended to the configured
//! log file when one is set.
//!
//! # Usage
//!
//! ```ignore
//! use tubepool_config::logging::*;
//!
//! init_logging(LogLevel::Info, Some(Path::new("log")))?;
//! log_run_info!("Worklist loaded", items = 12);
//! ```

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

/// Env var consulted before `RUST_LOG`
pub const LOG_ENV_VAR: &str = "TUBEPOOL_LOG";

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const RUN: &'static str = "RUN";
    pub const FETCH: &'static str = "FETCH";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// `-v` count to level; the default shows the whole run log.
    pub fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === RUN logging macros ===

#[macro_export]
macro_rules! log_run_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = $crate::logging::Component::RUN, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_run_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::RUN, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_run_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::RUN, $($key = $value,)* $msg)
    };
}

// === FETCH logging macros ===

#[macro_export]
macro_rules! log_fetch_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::FETCH, $($key = $value,)* $msg)
    };
}

/// Resolve the filter: `TUBEPOOL_LOG`, then `RUST_LOG`, then `level`.
pub fn env_filter(level: LogLevel) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

/// Initialize logging. Call this once at application startup.
///
/// When `log_file` is set, events are also appended to it without ANSI
/// colors. Fails only if the log file cannot be opened.
pub fn init_logging(level: LogLevel, log_file: Option<&Path>) -> io::Result<()> {
    use tracing_subscriber::{fmt, prelude::*};

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}
