//! SQLite implementation of the LedgerStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use iron_kernel_core::Blake3Hash;
use iron_kernel_ledger::LogEntry;

use crate::codec::{decode_entry, encode_entry};
use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{check_append, InsertResult, LedgerStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("connection mutex poisoned: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {e}")))?
    }
}

fn hash_from_blob(bytes: &[u8]) -> Result<Blake3Hash> {
    <[u8; 32]>::try_from(bytes)
        .map(Blake3Hash::from_bytes)
        .map_err(|_| StoreError::InvalidData(format!("hash column holds {} bytes", bytes.len())))
}

fn decode_all(blobs: Vec<Vec<u8>>) -> Result<Vec<LogEntry>> {
    blobs.iter().map(|b| decode_entry(b)).collect()
}

fn query_entries(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<LogEntry>> {
    let mut stmt = conn.prepare(sql)?;
    let blobs = stmt
        .query_map(params, |row| row.get::<_, Vec<u8>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    decode_all(blobs)
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn append_entry(&self, seq: u64, entry: &LogEntry) -> Result<InsertResult> {
        let entry = entry.clone();
        let blob = encode_entry(&entry)?;

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let stored: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT hash FROM audit_entries WHERE seq = ?1",
                    params![seq as i64],
                    |row| row.get(0),
                )
                .optional()?;
            let stored = stored.as_deref().map(hash_from_blob).transpose()?;

            let count: i64 =
                tx.query_row("SELECT COUNT(*) FROM audit_entries", [], |row| row.get(0))?;
            let head: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT hash FROM audit_entries ORDER BY seq DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            let head = head.as_deref().map(hash_from_blob).transpose()?;

            if let Some(result) = check_append(seq, &entry, stored, count as u64, head)? {
                return Ok(result);
            }

            tx.execute(
                "INSERT INTO audit_entries (
                    seq, hash, previous_hash, action_id, initiator, metric_id,
                    status, logical_time, logical_seq, entry, stored_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    seq as i64,
                    entry.hash.as_bytes().as_slice(),
                    entry.previous_hash.as_bytes().as_slice(),
                    entry.action.action_id.as_bytes().as_slice(),
                    entry.action.initiator.as_str(),
                    entry.action.metric_id().as_str(),
                    entry.status.as_str(),
                    entry.timestamp.time as i64,
                    entry.timestamp.logical as i64,
                    blob,
                    now_millis(),
                ],
            )?;
            tx.commit()?;

            debug!(seq, hash = %entry.hash, "audit entry persisted");
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_entry(&self, seq: u64) -> Result<Option<LogEntry>> {
        self.run(move |conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT entry FROM audit_entries WHERE seq = ?1",
                    params![seq as i64],
                    |row| row.get(0),
                )
                .optional()?;
            blob.as_deref().map(decode_entry).transpose()
        })
        .await
    }

    async fn get_entry_by_hash(&self, hash: &Blake3Hash) -> Result<Option<LogEntry>> {
        let hash = *hash;
        self.run(move |conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT entry FROM audit_entries WHERE hash = ?1",
                    params![hash.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            blob.as_deref().map(decode_entry).transpose()
        })
        .await
    }

    async fn entries_range(&self, start: u64, end: u64) -> Result<Vec<LogEntry>> {
        self.run(move |conn| {
            query_entries(
                conn,
                "SELECT entry FROM audit_entries WHERE seq >= ?1 AND seq <= ?2 ORDER BY seq",
                params![start as i64, end.min(i64::MAX as u64) as i64],
            )
        })
        .await
    }

    async fn entries_for_metric(&self, metric: &str) -> Result<Vec<LogEntry>> {
        let metric = metric.to_owned();
        self.run(move |conn| {
            query_entries(
                conn,
                "SELECT entry FROM audit_entries WHERE metric_id = ?1 ORDER BY seq",
                params![metric],
            )
        })
        .await
    }

    async fn all_entries(&self) -> Result<Vec<LogEntry>> {
        self.run(|conn| query_entries(conn, "SELECT entry FROM audit_entries ORDER BY seq", []))
            .await
    }

    async fn count(&self) -> Result<u64> {
        self.run(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM audit_entries", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn head(&self) -> Result<Option<(u64, Blake3Hash)>> {
        self.run(|conn| {
            let row: Option<(i64, Vec<u8>)> = conn
                .query_row(
                    "SELECT seq, hash FROM audit_entries ORDER BY seq DESC LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            row.map(|(seq, hash)| -> Result<(u64, Blake3Hash)> {
                Ok((seq as u64, hash_from_blob(&hash)?))
            })
            .transpose()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;
    use iron_kernel_core::{ActionBuilder, Keypair};
    use iron_kernel_ledger::{AuditLog, LogStatus};
    use serde_json::json;

    fn sample_log() -> AuditLog {
        let keypair = Keypair::from_seed(&[9; 32]);
        let log = AuditLog::new();

        let ok = ActionBuilder::new("alice", "system.load", 10.0).at(1, 0).sign(&keypair);
        log.append(&ok, LogStatus::Success, None, None);

        let over = ActionBuilder::new("alice", "system.load", 100.0).at(2, 0).sign(&keypair);
        log.append(
            &over,
            LogStatus::Reject,
            Some("Entity alice lacks Jurisdiction or exceeds limits".into()),
            Some(json!({
                "violationType": "AUTHORITY_OVERSCOPE",
                "target": "system.load",
                "context": { "value": 100.0 }
            })),
        );

        let text = ActionBuilder::new("bob", "system.mode", "eco").at(3, 1).sign(&keypair);
        log.append(&text, LogStatus::Failure, Some("Invalid Signature from bob".into()), None);
        log
    }

    #[tokio::test]
    async fn test_append_and_get_entry() {
        let store = SqliteStore::open_memory().unwrap();
        let log = sample_log();
        let history = log.history();

        assert_eq!(store.append_entry(0, &history[0]).await.unwrap(), InsertResult::Inserted);
        let back = store.get_entry(0).await.unwrap().unwrap();
        assert_eq!(back, history[0]);
        assert!(store.get_entry(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_idempotent_append() {
        let store = SqliteStore::open_memory().unwrap();
        let history = sample_log().history();

        assert_eq!(store.append_entries(0, &history).await.unwrap(), 3);
        assert_eq!(
            store.append_entry(2, &history[2]).await.unwrap(),
            InsertResult::AlreadyExists
        );
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_conflict_detection() {
        let store = SqliteStore::open_memory().unwrap();
        let history = sample_log().history();
        store.append_entries(0, &history).await.unwrap();

        let mut rewritten = history[1].clone();
        rewritten.status = LogStatus::Success;
        rewritten.hash = rewritten.recompute_hash();

        let result = store.append_entry(1, &rewritten).await.unwrap();
        assert_eq!(result, InsertResult::Conflict { existing: history[1].hash });
        assert!(matches!(
            store.append_entries(1, &[rewritten]).await,
            Err(StoreError::Conflict { seq: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_discontinuity_is_refused() {
        let store = SqliteStore::open_memory().unwrap();
        let history = sample_log().history();

        assert!(matches!(
            store.append_entry(0, &history[1]).await,
            Err(StoreError::Discontinuity { seq: 0, .. })
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queries() {
        let store = SqliteStore::open_memory().unwrap();
        let log = sample_log();
        store.append_entries(0, &log.history()).await.unwrap();

        assert_eq!(store.head().await.unwrap(), Some((2, log.head())));
        assert_eq!(store.entries_range(0, 1).await.unwrap().len(), 2);
        assert_eq!(store.entries_range(1, u64::MAX).await.unwrap().len(), 2);
        assert_eq!(store.entries_for_metric("system.load").await.unwrap().len(), 2);
        assert_eq!(store.entries_for_metric("system.mode").await.unwrap().len(), 1);

        let second = log.entry(1).unwrap();
        let found = store.get_entry_by_hash(&second.hash).await.unwrap().unwrap();
        assert_eq!(found.metadata, second.metadata);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let log = sample_log();

        {
            let store = SqliteStore::open(&path).unwrap();
            store.append_entries(0, &log.history()).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let entries = store.all_entries().await.unwrap();
        let restored = AuditLog::restore(entries).unwrap();
        assert_eq!(restored.head(), log.head());
        assert_eq!(restored.len(), 3);
    }
}
