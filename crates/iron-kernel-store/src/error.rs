//! Error types for the store module.

use thiserror::Error;

use iron_kernel_core::Blake3Hash;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Entry encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A different entry is already stored at this position.
    #[error("conflict at seq {seq}: existing entry {existing}")]
    Conflict { seq: u64, existing: Blake3Hash },

    /// The entry does not extend the stored chain.
    #[error("chain discontinuity at seq {seq}: {reason}")]
    Discontinuity { seq: u64, reason: String },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The blocking task or connection lock failed.
    #[error("store task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
