//! Compact binary encoding of audit entries.
//!
//! Entries are persisted as CBOR. Decoding restores every field the chain
//! hash covers, so a restored entry recomputes to its stored hash.

use iron_kernel_ledger::LogEntry;

use crate::error::{Result, StoreError};

pub fn encode_entry(entry: &LogEntry) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(entry, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

pub fn decode_entry(bytes: &[u8]) -> Result<LogEntry> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}
