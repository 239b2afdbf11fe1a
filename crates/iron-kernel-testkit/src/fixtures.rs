//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use iron_kernel::{GovernanceKernel, KernelConfig};
use iron_kernel_authority::{Delegation, IdentityRegistry, METRIC_WRITE};
use iron_kernel_core::{
    Action, ActionBuilder, Blake3Hash, Keypair, LogicalClock, LogicalTimestamp, MetricValue,
};
use iron_kernel_ledger::{AuditLog, MetricDefinition, MetricRegistry};
use iron_kernel_protocol::{Protocol, ProtocolEngine};

/// Id of the root principal every fixture starts with.
pub const ROOT: &str = "admin";

/// Gauges registered by [`KernelFixture::new`].
pub const METRICS: &[&str] = &[
    "system.load",
    "system.cpu.core1",
    "system.fan",
    "user.data",
    "expenditure",
    "temp",
    "fan",
];

/// Deterministic key for a principal id.
pub fn keypair_for(id: &str) -> Keypair {
    Keypair::from_seed(Blake3Hash::hash(id.as_bytes()).as_bytes())
}

/// A booted kernel with a root principal, a set of gauges, and a clock for
/// stamping actions.
pub struct KernelFixture {
    pub kernel: GovernanceKernel,
    pub clock: LogicalClock,
    keys: HashMap<String, Keypair>,
    next_grant: usize,
}

impl KernelFixture {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        Self::with_audit(Arc::new(AuditLog::new()), config)
    }

    /// Build on an existing audit log, e.g. one restored from a store.
    pub fn with_audit(audit: Arc<AuditLog>, config: KernelConfig) -> Self {
        let root = keypair_for(ROOT);
        let identities = Arc::new(IdentityRegistry::new());
        identities
            .register(ROOT, root.public_key(), true, LogicalTimestamp::ZERO)
            .expect("fresh registry");

        let metrics = Arc::new(MetricRegistry::new());
        for id in METRICS {
            metrics.register(MetricDefinition::gauge(*id));
        }

        let mut kernel = GovernanceKernel::new(identities, metrics, audit, config);
        kernel.boot();

        Self {
            kernel,
            clock: LogicalClock::new(),
            keys: HashMap::from([(ROOT.to_owned(), root)]),
            next_grant: 1,
        }
    }

    /// Register a non-root principal with a deterministic key.
    pub fn add_principal(&mut self, id: &str) -> &Keypair {
        let keypair = keypair_for(id);
        self.kernel
            .identities()
            .register(id, keypair.public_key(), false, LogicalTimestamp::ZERO)
            .expect("principal id already taken");
        self.keys.entry(id.to_owned()).or_insert(keypair)
    }

    pub fn key(&self, id: &str) -> &Keypair {
        self.keys
            .get(id)
            .unwrap_or_else(|| panic!("no key for {id}"))
    }

    /// Root grants `grantee` write power over `jurisdiction`, optionally
    /// capped. Returns the grant id.
    pub fn grant(&mut self, grantee: &str, jurisdiction: &str, limit: Option<f64>) -> String {
        let id = format!("grant-{}", self.next_grant);
        self.next_grant += 1;

        let mut delegation = Delegation::new(id.as_str(), ROOT, grantee, jurisdiction)
            .capacity("operator")
            .granted_at(self.clock.now());
        if let Some(cap) = limit {
            delegation = delegation.limit(METRIC_WRITE, cap);
        }
        self.kernel
            .grant_authority(ROOT, delegation)
            .expect("root may always grant");
        id
    }

    /// A signed action from `who`, stamped with the next clock tick.
    pub fn action(&mut self, who: &str, metric: &str, value: impl Into<MetricValue>) -> Action {
        let at = self.clock.tick();
        ActionBuilder::new(who, metric, value)
            .timestamp(at)
            .sign(self.key(who))
    }

    /// Propose, ratify and activate a protocol.
    pub fn activate(&mut self, protocol: Protocol) -> String {
        activate(self.kernel.protocols_mut(), protocol)
    }
}

impl Default for KernelFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk a protocol through PROPOSED -> RATIFIED -> ACTIVE.
pub fn activate(engine: &mut ProtocolEngine, protocol: Protocol) -> String {
    let id = engine.propose(protocol).expect("valid protocol");
    engine.ratify(&id).expect("ratify");
    engine.activate(&id).expect("activate");
    id
}
