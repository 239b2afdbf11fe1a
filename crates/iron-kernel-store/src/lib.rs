//! # Iron Kernel Store
//!
//! Persistence for the audit log. The kernel decides synchronously; this
//! crate is the async I/O boundary where evidence is written to disk.
//!
//! ## Key Types
//!
//! - [`LedgerStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of appending an entry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use iron_kernel_store::{LedgerStore, SqliteStore, StoreExt};
//! use iron_kernel_ledger::{AuditLog, LogEntry};
//!
//! async fn example(log: &AuditLog) -> iron_kernel_store::Result<()> {
//!     let store = SqliteStore::open("audit.db")?;
//!
//!     // Persist whatever the store has not seen yet
//!     let stored = store.count().await?;
//!     store.append_entries(stored, &log.entries_since(stored as usize)).await?;
//!
//!     // Later: rebuild and verify
//!     let entries: Vec<LogEntry> = store.all_entries().await?;
//!     let _restored = AuditLog::restore(entries);
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent appends**: Appending the same entry twice returns `AlreadyExists`
//! - **Conflict detection**: A different entry at a stored position returns `Conflict`
//! - **Continuity**: Appends must extend the stored head; gaps are refused
//! - **Encoding**: Entries are stored as CBOR next to indexed columns

pub mod codec;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, LedgerStore, StoreExt};
