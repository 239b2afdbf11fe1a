//! Property tests over jurisdiction, time ordering and the audit chain.

use proptest::prelude::*;

use iron_kernel::authority::{AuthorityDescriptor, METRIC_WRITE};
use iron_kernel::core::Jurisdiction;
use iron_kernel::ledger::{AuditLog, LedgerError};
use iron_kernel::{ActionBuilder, LogicalTimestamp};
use iron_kernel_testkit::generators::{jurisdiction, scope_path, segment};
use iron_kernel_testkit::KernelFixture;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn grants_cover_exactly_their_subtree(
        path in scope_path(),
        cut in 1usize..=4,
        stranger in segment(),
    ) {
        let cut = cut.min(path.len());
        let scope = path[..cut].join(".");
        let target = path.join(".");

        let mut fx = KernelFixture::new();
        fx.add_principal("bot");
        fx.grant("bot", &scope, None);
        let authority = fx.kernel.authority();
        let at = LogicalTimestamp::ZERO;

        let write = |scope: &str| AuthorityDescriptor::new(METRIC_WRITE, scope);
        prop_assert!(authority.authorized("bot", &write(&target), at));

        // A sibling that merely shares a textual prefix is outside.
        let lookalike = format!("{scope}{stranger}");
        prop_assert!(!authority.authorized("bot", &write(&lookalike), at));
    }

    #[test]
    fn wildcard_contains_everything(j in jurisdiction(), path in scope_path()) {
        prop_assert!(Jurisdiction::wildcard().encloses(&j));
        prop_assert!(Jurisdiction::wildcard().contains(&path.join(".")));
    }

    #[test]
    fn committed_history_never_goes_back(
        times in prop::collection::vec((0u64..20, 0u64..3), 1..24),
    ) {
        let mut fx = KernelFixture::new();
        fx.add_principal("bot");
        fx.grant("bot", "system", None);

        for (i, (time, logical)) in times.into_iter().enumerate() {
            let action = ActionBuilder::new("bot", "system.load", i as f64)
                .timestamp(LogicalTimestamp::new(time, logical))
                .sign(fx.key("bot"));
            let _ = fx.kernel.execute(action, None);
        }

        let history = fx.kernel.state().get_history("system.load");
        prop_assert!(history.windows(2).all(|w| w[0].updated_at <= w[1].updated_at));
        let log = fx.kernel.audit().history();
        prop_assert!(log.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        prop_assert!(fx.kernel.state().verify_metric_chain("system.load").is_ok());
    }

    #[test]
    fn any_edit_breaks_the_chain_at_that_entry(
        values in prop::collection::vec(-100.0f64..100.0, 2..10),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut fx = KernelFixture::new();
        fx.add_principal("bot");
        fx.grant("bot", "*", None);
        for value in &values {
            let action = fx.action("bot", "temp", *value);
            fx.kernel.execute(action, None).expect("authorized");
        }

        let mut entries = fx.kernel.audit().history();
        let index = pick.index(entries.len());
        entries[index].reason = Some("edited".into());
        let chain_broken_at_index = matches!(
            AuditLog::restore(entries),
            Err(LedgerError::ChainBroken { index: broken }) if broken == index
        );
        prop_assert!(chain_broken_at_index);
    }
}
