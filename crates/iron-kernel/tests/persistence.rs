//! Audit persistence and chain integrity across restarts.

use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;

use iron_kernel::ledger::{AuditLog, LedgerError, LogStatus};
use iron_kernel::store::{LedgerStore, MemoryStore, SqliteStore};
use iron_kernel::{GovernanceKernel, KernelConfig, KernelError};
use iron_kernel_testkit::KernelFixture;

fn busy_fixture() -> KernelFixture {
    let mut fx = KernelFixture::new();
    fx.add_principal("bot");
    fx.grant("bot", "system", Some(20.0));
    for value in [1.0, 2.0, 3.0] {
        let action = fx.action("bot", "system.load", value);
        fx.kernel.execute(action, None).expect("within quota");
    }
    let outside = fx.action("bot", "user.data", 1.0);
    assert!(fx.kernel.execute(outside, None).is_err());
    fx
}

#[tokio::test]
async fn persist_is_incremental() -> Result<()> {
    let mut fx = busy_fixture();
    let store = MemoryStore::new();

    assert_eq!(fx.kernel.persist_audit(&store).await?, 7);
    assert_eq!(fx.kernel.persist_audit(&store).await?, 0);

    let action = fx.action("bot", "system.load", 4.0);
    fx.kernel.execute(action, None)?;
    assert_eq!(fx.kernel.persist_audit(&store).await?, 2);

    let (seq, head) = store.head().await?.expect("non-empty");
    assert_eq!(seq, 8);
    assert_eq!(head, fx.kernel.audit().head());
    Ok(())
}

#[tokio::test]
async fn sqlite_survives_restart() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("audit.db");

    let fx = busy_fixture();
    {
        let store = SqliteStore::open(&path)?;
        fx.kernel.persist_audit(&store).await?;
    }

    let store = SqliteStore::open(&path)?;
    let restored = GovernanceKernel::load_audit(&store).await?;
    assert_eq!(restored.len(), fx.kernel.audit().len());
    assert_eq!(restored.head(), fx.kernel.audit().head());
    restored.verify_chain()?;

    let rejects = store.entries_for_metric("user.data").await?;
    assert_eq!(rejects.len(), 1);
    assert_eq!(rejects[0].status, LogStatus::Reject);

    // A kernel built on the restored log keeps extending the same chain.
    let mut next = KernelFixture::with_audit(Arc::new(restored), KernelConfig::default());
    next.add_principal("bot");
    next.grant("bot", "system", None);
    let action = next.action("bot", "system.load", 9.0);
    next.kernel.execute(action, None)?;
    assert_eq!(next.kernel.persist_audit(&store).await?, 2);
    assert_eq!(store.count().await?, 9);
    Ok(())
}

#[tokio::test]
async fn persisting_onto_a_foreign_chain_fails() -> Result<()> {
    let store = MemoryStore::new();
    busy_fixture().kernel.persist_audit(&store).await?;

    let mut other = KernelFixture::new();
    other.add_principal("eve");
    other.grant("eve", "*", None);
    for value in [7.0, 8.0, 9.0, 10.0, 11.0] {
        let action = other.action("eve", "temp", value);
        other.kernel.execute(action, None)?;
    }
    let err = other.kernel.persist_audit(&store).await.unwrap_err();
    assert!(matches!(err, KernelError::Store(_)));
    assert_eq!(store.count().await?, 7);
    Ok(())
}

#[test]
fn tampering_breaks_the_chain_from_that_entry() {
    let fx = busy_fixture();
    fx.kernel.audit().verify_chain().expect("intact");

    let mut entries = fx.kernel.audit().history();
    entries[1].reason = Some("nothing to see".into());
    match AuditLog::restore(entries) {
        Err(LedgerError::ChainBroken { index }) => assert_eq!(index, 1),
        other => panic!("expected broken chain, got {other:?}"),
    }

    let mut entries = fx.kernel.audit().history();
    entries.remove(2);
    assert!(AuditLog::restore(entries).is_err());
}

#[test]
fn state_chain_links_to_audit_evidence() -> Result<()> {
    let fx = busy_fixture();
    fx.kernel.state().verify_metric_chain("system.load")?;

    let history = fx.kernel.state().get_history("system.load");
    let log = fx.kernel.audit().history();
    for version in history {
        assert!(log.iter().any(|e| e.hash == version.evidence_hash));
    }
    Ok(())
}
