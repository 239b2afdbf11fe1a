//! LedgerStore trait: the abstract interface for audit persistence.
//!
//! The kernel's decision logic is synchronous; persistence sits at the I/O
//! boundary behind this async trait. Implementations include SQLite
//! (primary) and in-memory (for tests).

use async_trait::async_trait;
use iron_kernel_core::Blake3Hash;
use iron_kernel_ledger::LogEntry;

use crate::error::{Result, StoreError};

/// Result of appending an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Entry was stored.
    Inserted,
    /// The same entry is already stored at this position.
    AlreadyExists,
    /// A different entry occupies this position.
    Conflict {
        /// Hash of the stored entry.
        existing: Blake3Hash,
    },
}

/// Async interface for audit entry persistence.
///
/// Entries are addressed by their zero-based position in the chain
/// (`seq`). A store only ever holds a prefix of one chain:
///
/// - **Idempotent appends**: storing the same entry twice returns `AlreadyExists`.
/// - **Conflict detection**: a different entry at an occupied position
///   returns `Conflict` with the stored hash.
/// - **Continuity**: a new entry must land at `count()` and link to the
///   stored head; anything else is a `Discontinuity` error.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an entry at position `seq`.
    async fn append_entry(&self, seq: u64, entry: &LogEntry) -> Result<InsertResult>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the entry at a position.
    async fn get_entry(&self, seq: u64) -> Result<Option<LogEntry>>;

    /// Get an entry by its chain hash.
    async fn get_entry_by_hash(&self, hash: &Blake3Hash) -> Result<Option<LogEntry>>;

    /// Entries with `start <= seq <= end`, ordered by seq.
    async fn entries_range(&self, start: u64, end: u64) -> Result<Vec<LogEntry>>;

    /// Entries whose action targets `metric`, ordered by seq.
    async fn entries_for_metric(&self, metric: &str) -> Result<Vec<LogEntry>>;

    /// Every stored entry, ordered by seq.
    async fn all_entries(&self) -> Result<Vec<LogEntry>>;

    /// Number of stored entries.
    async fn count(&self) -> Result<u64>;

    /// Position and hash of the newest entry.
    async fn head(&self) -> Result<Option<(u64, Blake3Hash)>>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: LedgerStore {
    /// Append a run of consecutive entries starting at `start`.
    ///
    /// Entries already present are skipped. Returns how many were newly
    /// stored; a conflicting entry stops the run with an error.
    fn append_entries(
        &self,
        start: u64,
        entries: &[LogEntry],
    ) -> impl std::future::Future<Output = Result<usize>> + Send;
}

impl<S: LedgerStore + ?Sized> StoreExt for S {
    async fn append_entries(&self, start: u64, entries: &[LogEntry]) -> Result<usize> {
        let mut inserted = 0;
        for (offset, entry) in entries.iter().enumerate() {
            let seq = start + offset as u64;
            match self.append_entry(seq, entry).await? {
                InsertResult::Inserted => inserted += 1,
                InsertResult::AlreadyExists => {}
                InsertResult::Conflict { existing } => {
                    return Err(StoreError::Conflict { seq, existing });
                }
            }
        }
        Ok(inserted)
    }
}

/// Shared position check for implementations.
///
/// `stored` is the hash at `seq` if any, `count` the number of stored
/// entries and `head` the hash at `count - 1`.
pub(crate) fn check_append(
    seq: u64,
    entry: &LogEntry,
    stored: Option<Blake3Hash>,
    count: u64,
    head: Option<Blake3Hash>,
) -> Result<Option<InsertResult>> {
    if let Some(existing) = stored {
        return Ok(Some(if existing == entry.hash {
            InsertResult::AlreadyExists
        } else {
            InsertResult::Conflict { existing }
        }));
    }

    if seq != count {
        return Err(StoreError::Discontinuity {
            seq,
            reason: format!("next free position is {count}"),
        });
    }

    let expected = head.unwrap_or(iron_kernel_ledger::GENESIS_HASH);
    if entry.previous_hash != expected {
        return Err(StoreError::Discontinuity {
            seq,
            reason: format!("links to {}, head is {}", entry.previous_hash, expected),
        });
    }

    Ok(None)
}
