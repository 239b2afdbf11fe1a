//! The audit log: an append-only hash chain of every attempted mutation.
//!
//! Each entry links to its predecessor:
//!
//! ```text
//! hash = blake3(previous_hash || canonical(action) || status || reason || canonical(metadata))
//! ```
//!
//! The first entry links to [`GENESIS_HASH`]. Recomputing forward from
//! genesis must reproduce every stored hash; editing any entry breaks that
//! entry and everything after it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use iron_kernel_core::{canonical_json, Action, ActionId, Blake3Hash, LogicalTimestamp};

use crate::error::{LedgerError, Result};

/// Previous-hash sentinel for the first entry.
pub const GENESIS_HASH: Blake3Hash = Blake3Hash::ZERO;

/// Outcome recorded for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    /// Guard authorized the attempt; the mutation has not happened yet.
    Accept,
    /// The mutation was applied.
    Success,
    /// The full apply path failed (bad signature, invalid value, time breach).
    Failure,
    /// Guard refused the attempt.
    Reject,
    /// Guard accepted but commit could not proceed.
    Aborted,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Accept => "ACCEPT",
            LogStatus::Success => "SUCCESS",
            LogStatus::Failure => "FAILURE",
            LogStatus::Reject => "REJECT",
            LogStatus::Aborted => "ABORTED",
        }
    }

    /// Statuses that appear in breach reports.
    pub fn is_breach(&self) -> bool {
        matches!(self, LogStatus::Reject | LogStatus::Aborted)
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One link in the audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub hash: Blake3Hash,
    pub previous_hash: Blake3Hash,
    pub action: Action,
    pub status: LogStatus,
    pub reason: Option<String>,
    pub metadata: Option<Value>,
    pub timestamp: LogicalTimestamp,
}

impl LogEntry {
    /// Compute the chain hash for an entry's contents.
    pub fn compute_hash(
        previous_hash: &Blake3Hash,
        action: &Action,
        status: LogStatus,
        reason: Option<&str>,
        metadata: Option<&Value>,
    ) -> Blake3Hash {
        let action_bytes = canonical_json(&action.to_json());
        let metadata_bytes = metadata.map(canonical_json).unwrap_or_default();
        Blake3Hash::hash_parts(&[
            previous_hash.as_bytes(),
            action_bytes.as_bytes(),
            status.as_str().as_bytes(),
            reason.unwrap_or_default().as_bytes(),
            metadata_bytes.as_bytes(),
        ])
    }

    /// Recompute this entry's hash from its contents.
    pub fn recompute_hash(&self) -> Blake3Hash {
        Self::compute_hash(
            &self.previous_hash,
            &self.action,
            self.status,
            self.reason.as_deref(),
            self.metadata.as_ref(),
        )
    }

    pub fn action_id(&self) -> &ActionId {
        &self.action.action_id
    }
}

/// An incident and the initiator's activity leading up to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub incident: LogEntry,
    /// Earlier entries from the same initiator, oldest first.
    pub timeline: Vec<LogEntry>,
}

/// Append-only, hash-chained evidence log.
///
/// Shared by reference between the state model (writer) and readers such
/// as the interface facade.
#[derive(Debug, Default)]
pub struct AuditLog {
    chain: RwLock<Vec<LogEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<LogEntry>> {
        self.chain.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<LogEntry>> {
        self.chain.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild a log from persisted entries, refusing a broken chain.
    pub fn restore(entries: Vec<LogEntry>) -> Result<Self> {
        verify_entries(&entries)?;
        Ok(Self {
            chain: RwLock::new(entries),
        })
    }

    /// Append an entry and return a copy of it.
    pub fn append(
        &self,
        action: &Action,
        status: LogStatus,
        reason: Option<String>,
        metadata: Option<Value>,
    ) -> LogEntry {
        let mut chain = self.write();
        let previous_hash = chain.last().map_or(GENESIS_HASH, |e| e.hash);
        let hash = LogEntry::compute_hash(
            &previous_hash,
            action,
            status,
            reason.as_deref(),
            metadata.as_ref(),
        );

        let entry = LogEntry {
            hash,
            previous_hash,
            action: action.clone(),
            status,
            reason,
            metadata,
            timestamp: action.timestamp,
        };

        debug!(
            index = chain.len(),
            status = %status,
            action = %action.action_id,
            hash = %hash,
            "audit entry appended"
        );
        chain.push(entry.clone());
        entry
    }

    /// Snapshot of the full chain, in insertion order.
    pub fn history(&self) -> Vec<LogEntry> {
        self.read().clone()
    }

    /// Entries from `index` onward.
    pub fn entries_since(&self, index: usize) -> Vec<LogEntry> {
        self.read().iter().skip(index).cloned().collect()
    }

    pub fn entry(&self, index: usize) -> Option<LogEntry> {
        self.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Hash of the newest entry, or genesis when empty.
    pub fn head(&self) -> Blake3Hash {
        self.read().last().map_or(GENESIS_HASH, |e| e.hash)
    }

    /// Recompute the chain from genesis.
    pub fn verify_chain(&self) -> Result<()> {
        verify_entries(&self.read())
    }

    /// Entries whose action targets `metric`.
    pub fn entries_for_metric(&self, metric: &str) -> Vec<LogEntry> {
        self.read()
            .iter()
            .filter(|e| e.action.metric_id().as_str() == metric)
            .cloned()
            .collect()
    }

    /// Rejected and aborted attempts.
    pub fn breaches(&self) -> Vec<LogEntry> {
        self.read()
            .iter()
            .filter(|e| e.status.is_breach())
            .cloned()
            .collect()
    }

    /// The latest entry for `action_id` plus up to `window` earlier entries
    /// from the same initiator at or before its timestamp.
    pub fn reconstruct_incident(&self, action_id: &ActionId, window: usize) -> Option<Incident> {
        let chain = self.read();
        let position = chain.iter().rposition(|e| e.action_id() == action_id)?;
        let incident = chain[position].clone();

        let mut timeline: Vec<LogEntry> = chain[..position]
            .iter()
            .rev()
            .filter(|e| {
                e.action.initiator == incident.action.initiator && e.timestamp <= incident.timestamp
            })
            .take(window)
            .cloned()
            .collect();
        timeline.reverse();

        Some(Incident { incident, timeline })
    }
}

fn verify_entries(entries: &[LogEntry]) -> Result<()> {
    let mut expected_prev = GENESIS_HASH;
    for (index, entry) in entries.iter().enumerate() {
        if entry.previous_hash != expected_prev || entry.recompute_hash() != entry.hash {
            return Err(LedgerError::ChainBroken { index });
        }
        expected_prev = entry.hash;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use iron_kernel_core::{ActionBuilder, Keypair};
    use proptest::prelude::*;
    use serde_json::json;

    fn action(initiator: &str, metric: &str, value: i64, time: u64) -> Action {
        let keypair = Keypair::from_seed(&[0x11; 32]);
        ActionBuilder::new(initiator, metric, value)
            .at(time, 0)
            .sign(&keypair)
    }

    #[test]
    fn test_genesis_link() {
        let log = AuditLog::new();
        assert_eq!(log.head(), GENESIS_HASH);

        let first = log.append(&action("a", "m", 1, 1), LogStatus::Success, None, None);
        assert_eq!(first.previous_hash, GENESIS_HASH);

        let second = log.append(&action("a", "m", 2, 2), LogStatus::Success, None, None);
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(log.head(), second.hash);
        log.verify_chain().unwrap();
    }

    #[test]
    fn test_reason_and_metadata_are_hashed() {
        let a = action("a", "m", 1, 1);
        let plain = LogEntry::compute_hash(&GENESIS_HASH, &a, LogStatus::Reject, None, None);
        let reasoned =
            LogEntry::compute_hash(&GENESIS_HASH, &a, LogStatus::Reject, Some("why"), None);
        let meta = json!({"violationType": "AUTHORITY_OVERSCOPE"});
        let with_meta =
            LogEntry::compute_hash(&GENESIS_HASH, &a, LogStatus::Reject, Some("why"), Some(&meta));

        assert_ne!(plain, reasoned);
        assert_ne!(reasoned, with_meta);
    }

    #[test]
    fn test_tamper_detected() {
        let log = AuditLog::new();
        for t in 1..=4 {
            log.append(&action("a", "m", t as i64, t), LogStatus::Success, None, None);
        }

        let mut entries = log.history();
        entries[1].status = LogStatus::Failure;
        assert!(matches!(
            AuditLog::restore(entries),
            Err(LedgerError::ChainBroken { index: 1 })
        ));

        let mut entries = log.history();
        entries[3].reason = Some("edited".into());
        assert!(matches!(
            AuditLog::restore(entries),
            Err(LedgerError::ChainBroken { index: 3 })
        ));
    }

    #[test]
    fn test_history_is_a_snapshot() {
        let log = AuditLog::new();
        log.append(&action("a", "m", 1, 1), LogStatus::Success, None, None);
        let mut snapshot = log.history();
        snapshot.clear();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_queries() {
        let log = AuditLog::new();
        log.append(&action("a", "load", 1, 1), LogStatus::Success, None, None);
        log.append(&action("b", "fan", 1, 2), LogStatus::Reject, Some("no".into()), None);
        log.append(&action("a", "load", 2, 3), LogStatus::Aborted, None, None);
        log.append(&action("a", "fan", 2, 4), LogStatus::Failure, None, None);

        assert_eq!(log.entries_for_metric("load").len(), 2);
        let breaches = log.breaches();
        assert_eq!(breaches.len(), 2);
        assert!(breaches.iter().all(|e| e.status.is_breach()));
    }

    #[test]
    fn test_incident_window() {
        let log = AuditLog::new();
        for t in 1..=8 {
            log.append(&action("mallory", "m", t as i64, t), LogStatus::Success, None, None);
            log.append(&action("alice", "m", t as i64, t), LogStatus::Success, None, None);
        }
        let target = action("mallory", "m", 99, 9);
        log.append(&target, LogStatus::Reject, Some("overscope".into()), None);

        let incident = log.reconstruct_incident(&target.action_id, 5).unwrap();
        assert_eq!(incident.incident.status, LogStatus::Reject);
        assert_eq!(incident.timeline.len(), 5);
        assert!(incident
            .timeline
            .iter()
            .all(|e| e.action.initiator.as_str() == "mallory"));
        let times: Vec<u64> = incident.timeline.iter().map(|e| e.timestamp.time).collect();
        assert_eq!(times, vec![4, 5, 6, 7, 8]);

        assert!(log.reconstruct_incident(&ActionId::ZERO, 5).is_none());
    }

    proptest! {
        #[test]
        fn prop_any_single_edit_breaks_chain(len in 2usize..10, victim in 0usize..10, delta in 1i64..100) {
            let victim = victim % len;
            let log = AuditLog::new();
            for t in 0..len {
                log.append(&action("a", "m", t as i64, t as u64), LogStatus::Success, None, None);
            }
            log.verify_chain().unwrap();

            let mut entries = log.history();
            entries[victim].action.payload.value = (t_value(victim) + delta).into();
            match AuditLog::restore(entries) {
                Err(LedgerError::ChainBroken { index }) => prop_assert_eq!(index, victim),
                other => prop_assert!(false, "expected broken chain, got {:?}", other.map(|l| l.len())),
            }
        }
    }

    fn t_value(i: usize) -> i64 {
        i as i64
    }
}
