//! In-memory implementation of the LedgerStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use iron_kernel_core::Blake3Hash;
use iron_kernel_ledger::LogEntry;

use crate::error::Result;
use crate::traits::{check_append, InsertResult, LedgerStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<LogEntry>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_entry(&self, seq: u64, entry: &LogEntry) -> Result<InsertResult> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let stored = entries.get(seq as usize).map(|e| e.hash);
        let head = entries.last().map(|e| e.hash);
        if let Some(result) = check_append(seq, entry, stored, entries.len() as u64, head)? {
            return Ok(result);
        }

        entries.push(entry.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_entry(&self, seq: u64) -> Result<Option<LogEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(seq as usize).cloned())
    }

    async fn get_entry_by_hash(&self, hash: &Blake3Hash) -> Result<Option<LogEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.iter().find(|e| e.hash == *hash).cloned())
    }

    async fn entries_range(&self, start: u64, end: u64) -> Result<Vec<LogEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .enumerate()
            .filter(|(seq, _)| (start..=end).contains(&(*seq as u64)))
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn entries_for_metric(&self, metric: &str) -> Result<Vec<LogEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .filter(|e| e.action.metric_id().as_str() == metric)
            .cloned()
            .collect())
    }

    async fn all_entries(&self) -> Result<Vec<LogEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.clone())
    }

    async fn count(&self) -> Result<u64> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.len() as u64)
    }

    async fn head(&self) -> Result<Option<(u64, Blake3Hash)>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .last()
            .map(|e| (entries.len() as u64 - 1, e.hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::traits::StoreExt;
    use iron_kernel_core::{ActionBuilder, Keypair};
    use iron_kernel_ledger::{AuditLog, LogStatus};

    fn sample_log(n: u64) -> AuditLog {
        let keypair = Keypair::from_seed(&[5; 32]);
        let log = AuditLog::new();
        for i in 0..n {
            let action = ActionBuilder::new("alice", "system.load", i as f64)
                .at(i + 1, 0)
                .sign(&keypair);
            log.append(&action, LogStatus::Success, None, None);
        }
        log
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let store = MemoryStore::new();
        let log = sample_log(3);

        let inserted = store.append_entries(0, &log.history()).await.unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(store.head().await.unwrap(), Some((2, log.head())));

        let second = store.get_entry(1).await.unwrap().unwrap();
        assert_eq!(second, log.entry(1).unwrap());
        let by_hash = store.get_entry_by_hash(&second.hash).await.unwrap().unwrap();
        assert_eq!(by_hash, second);

        assert_eq!(store.entries_range(1, 5).await.unwrap().len(), 2);
        assert_eq!(store.entries_for_metric("system.load").await.unwrap().len(), 3);
        assert!(store.entries_for_metric("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idempotent_append() {
        let store = MemoryStore::new();
        let log = sample_log(2);
        let history = log.history();

        store.append_entries(0, &history).await.unwrap();
        let again = store.append_entry(0, &history[0]).await.unwrap();
        assert_eq!(again, InsertResult::AlreadyExists);
        assert_eq!(store.append_entries(0, &history).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_conflicting_entry() {
        let store = MemoryStore::new();
        let ours = sample_log(1).history();
        store.append_entries(0, &ours).await.unwrap();

        let mut forged = ours[0].clone();
        forged.reason = Some("rewritten".into());
        forged.hash = forged.recompute_hash();

        let result = store.append_entry(0, &forged).await.unwrap();
        assert_eq!(result, InsertResult::Conflict { existing: ours[0].hash });
    }

    #[tokio::test]
    async fn test_gap_or_bad_link_is_refused() {
        let store = MemoryStore::new();
        let history = sample_log(3).history();

        assert!(matches!(
            store.append_entry(1, &history[1]).await,
            Err(StoreError::Discontinuity { seq: 1, .. })
        ));

        store.append_entry(0, &history[0]).await.unwrap();
        assert!(matches!(
            store.append_entry(1, &history[2]).await,
            Err(StoreError::Discontinuity { seq: 1, .. })
        ));
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
