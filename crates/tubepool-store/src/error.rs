use std::io;

use thiserror::Error;

/// Errors that can occur while acquiring or reclaiming pool content
#[derive(Error, Debug)]
pub enum PoolError {
    /// The external fetch collaborator could not produce the item.
    #[error("Transient fetch failure for {id}: {reason}")]
    TransientFetch { id: String, reason: String },

    #[error("Failed to link {name} for {subscriber}: {source}")]
    Link {
        subscriber: String,
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Archive ledger write failed for {id}: {source}")]
    LedgerWrite {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    FatalConfig(String),

    /// The capacity pass ran out of candidates while still over the limit.
    #[error(
        "Capacity policy cannot make progress: pool holds {total_bytes} bytes, limit is {capacity_bytes} bytes, no deletable entry left"
    )]
    CapacityStalled {
        total_bytes: u64,
        capacity_bytes: u64,
    },

    #[error("Run lock unavailable: {0}")]
    Lock(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PoolError {
    /// Per-item failures that leave the item unarchived so the next run retries it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PoolError::TransientFetch { .. } | PoolError::Link { .. } | PoolError::LedgerWrite { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
