//! Database schema migrations for SQLite.
//!
//! Versioned migrations: each one transforms the schema from version N to
//! N+1 inside a single transaction.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        info!(from = current, to = CURRENT_VERSION, "store schema migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: audit entries.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE audit_entries (
            seq INTEGER PRIMARY KEY,          -- position in the chain, from 0
            hash BLOB NOT NULL UNIQUE,        -- 32 bytes, chain hash
            previous_hash BLOB NOT NULL,      -- 32 bytes, zero for genesis
            action_id BLOB NOT NULL,          -- 32 bytes
            initiator TEXT NOT NULL,
            metric_id TEXT NOT NULL,
            status TEXT NOT NULL,             -- ACCEPT | SUCCESS | FAILURE | REJECT | ABORTED
            logical_time INTEGER NOT NULL,
            logical_seq INTEGER NOT NULL,
            entry BLOB NOT NULL,              -- CBOR-encoded entry
            stored_at INTEGER NOT NULL        -- local time of persistence (Unix ms)
        );

        CREATE INDEX idx_audit_metric ON audit_entries(metric_id);
        CREATE INDEX idx_audit_initiator ON audit_entries(initiator);
        CREATE INDEX idx_audit_status ON audit_entries(status);
        CREATE INDEX idx_audit_action ON audit_entries(action_id);
        "#,
    )?;

    Ok(())
}

/// Current time in milliseconds; zero if the clock is before the epoch.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
