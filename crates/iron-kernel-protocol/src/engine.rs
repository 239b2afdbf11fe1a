//! The protocol engine: registry, lifecycle, triggers, gates and bundles.
//!
//! Two modes share one registry:
//!
//! - **Automation**: active, non-strict protocols whose preconditions hold
//!   are triggered by [`ProtocolEngine::evaluate_and_execute`] and write
//!   their mutations through the state model as signed actions.
//! - **Gates**: active, strict protocols are consulted by
//!   [`ProtocolEngine::check_gate`] for every incoming action that targets a
//!   metric their rules reference, against the state as it would be after
//!   the action.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use iron_kernel_core::{
    Action, ActionBuilder, EntityId, Jurisdiction, Keypair, LogicalTimestamp, MetricId,
    MetricValue,
};
use iron_kernel_ledger::{MetricView, StateModel};

use crate::bundle::ProtocolBundle;
use crate::error::{ProtocolError, Result};
use crate::types::{Lifecycle, Protocol, Rule};

/// A state view with one metric replaced by a proposed value.
struct Overlay<'a> {
    base: &'a dyn MetricView,
    metric: &'a str,
    value: &'a MetricValue,
}

impl MetricView for Overlay<'_> {
    fn value_of(&self, metric: &str) -> Option<MetricValue> {
        if metric == self.metric {
            Some(self.value.clone())
        } else {
            self.base.value_of(metric)
        }
    }
}

/// A mutation a triggered protocol wants to make.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMutation {
    pub protocol_id: String,
    pub metric: MetricId,
    pub value: f64,
}

/// Registry and evaluator of protocols.
#[derive(Debug, Default)]
pub struct ProtocolEngine {
    protocols: BTreeMap<String, Protocol>,
}

impl ProtocolEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registry & lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Register a new protocol in the PROPOSED state.
    pub fn propose(&mut self, mut protocol: Protocol) -> Result<String> {
        if protocol.id.is_empty() {
            return Err(ProtocolError::Invalid {
                id: protocol.name.clone(),
                reason: "id is empty".into(),
            });
        }
        if self.protocols.contains_key(&protocol.id) {
            return Err(ProtocolError::DuplicateProtocol(protocol.id));
        }
        protocol.validate()?;

        protocol.lifecycle = Lifecycle::Proposed;
        let id = protocol.id.clone();
        debug!(protocol = %id, category = ?protocol.category, strict = protocol.strict, "protocol proposed");
        self.protocols.insert(id.clone(), protocol);
        Ok(id)
    }

    pub fn ratify(&mut self, id: &str) -> Result<()> {
        self.transition(id, Lifecycle::Ratified)
    }

    pub fn activate(&mut self, id: &str) -> Result<()> {
        self.transition(id, Lifecycle::Active)
    }

    pub fn suspend(&mut self, id: &str) -> Result<()> {
        self.transition(id, Lifecycle::Suspended)
    }

    pub fn deprecate(&mut self, id: &str) -> Result<()> {
        self.transition(id, Lifecycle::Deprecated)
    }

    pub fn revoke(&mut self, id: &str) -> Result<()> {
        self.transition(id, Lifecycle::Revoked)
    }

    fn transition(&mut self, id: &str, to: Lifecycle) -> Result<()> {
        let protocol = self
            .protocols
            .get_mut(id)
            .ok_or_else(|| ProtocolError::UnknownProtocol(id.to_owned()))?;

        if !protocol.lifecycle.can_transition(to) {
            return Err(ProtocolError::InvalidTransition {
                id: id.to_owned(),
                from: protocol.lifecycle,
                to,
            });
        }
        info!(protocol = id, from = %protocol.lifecycle, to = %to, "protocol lifecycle change");
        protocol.lifecycle = to;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Protocol> {
        self.protocols.get(id)
    }

    /// All protocols, ordered by id.
    pub fn protocols(&self) -> impl Iterator<Item = &Protocol> {
        self.protocols.values()
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Automation
    // ─────────────────────────────────────────────────────────────────────

    /// Whether a protocol would trigger now.
    ///
    /// Requires at least one precondition; all must hold.
    pub fn check_preconditions(&self, protocol: &Protocol, view: &dyn MetricView) -> bool {
        !protocol.preconditions.is_empty() && protocol.preconditions_hold(view)
    }

    /// Active automation protocols that trigger against `view`, by id.
    pub fn evaluate(&self, view: &dyn MetricView) -> Vec<&Protocol> {
        self.protocols
            .values()
            .filter(|p| p.is_active() && !p.strict && self.check_preconditions(p, view))
            .collect()
    }

    /// Mutations the triggered protocols would make, or a conflict if two
    /// of them target the same metric.
    ///
    /// Rules that hit the same metric within one protocol build on each
    /// other: each planned value includes the rules before it.
    pub fn plan(&self, view: &dyn MetricView) -> Result<Vec<PlannedMutation>> {
        let triggered = self.evaluate(view);

        let mut owners: BTreeMap<&MetricId, Vec<&str>> = BTreeMap::new();
        for protocol in &triggered {
            let targets: BTreeSet<&MetricId> = protocol.targets().collect();
            for metric in targets {
                owners.entry(metric).or_default().push(protocol.id.as_str());
            }
        }
        if let Some((metric, ids)) = owners.iter().find(|(_, ids)| ids.len() > 1) {
            warn!(metric = %metric, protocols = ?ids, "protocol conflict; nothing executed");
            return Err(ProtocolError::Conflict {
                metric: (*metric).clone(),
                protocols: ids.iter().map(|s| s.to_string()).collect(),
            });
        }

        let mut projected: BTreeMap<&MetricId, f64> = BTreeMap::new();
        let mut planned = Vec::new();
        for protocol in triggered {
            for rule in &protocol.execution {
                let Rule::MutateMetric {
                    metric_id,
                    mutation,
                } = rule;
                let value = projected
                    .entry(metric_id)
                    .or_insert_with(|| view.numeric(metric_id.as_str()).unwrap_or(0.0));
                *value += mutation;
                planned.push(PlannedMutation {
                    protocol_id: protocol.id.clone(),
                    metric: metric_id.clone(),
                    value: *value,
                });
            }
        }
        Ok(planned)
    }

    /// Trigger, check for conflicts, then apply every planned mutation as an
    /// action signed by `authority`, timestamped strictly after `time`.
    ///
    /// A conflict, or any planned action failing its checks, aborts before
    /// anything is applied.
    pub fn evaluate_and_execute(
        &self,
        state: &mut StateModel,
        authority: &EntityId,
        keypair: &Keypair,
        time: LogicalTimestamp,
    ) -> Result<Vec<Action>> {
        let planned = self.plan(&*state)?;

        let mut at = time;
        let actions: Vec<Action> = planned
            .iter()
            .map(|m| {
                at = at.next_logical();
                ActionBuilder::new(authority.clone(), m.metric.clone(), m.value)
                    .timestamp(at)
                    .sign(keypair)
            })
            .collect();

        for action in &actions {
            if let Err(err) = state.verify(action).and_then(|()| state.preflight(action)) {
                // Route the failing action through the full path so its
                // failure is recorded, then stop.
                state.apply(action)?;
                return Err(err.into());
            }
        }

        for action in &actions {
            state.apply(action)?;
        }

        if !actions.is_empty() {
            info!(count = actions.len(), at = %time, "protocol mutations applied");
        }
        Ok(actions)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Gates
    // ─────────────────────────────────────────────────────────────────────

    /// Active strict protocols that gate writes to `metric`.
    pub fn gates_for(&self, metric: &str) -> Vec<&Protocol> {
        self.protocols
            .values()
            .filter(|p| p.is_active() && p.strict && p.targets_metric(metric))
            .collect()
    }

    /// Reject the action if any gate's preconditions fail against the state
    /// as it would be after the action. Gates without preconditions impose
    /// no constraint.
    pub fn check_gate(&self, action: &Action, view: &dyn MetricView) -> Result<()> {
        let overlay = Overlay {
            base: view,
            metric: action.metric_id().as_str(),
            value: action.value(),
        };

        for gate in self.gates_for(action.metric_id().as_str()) {
            if !gate.preconditions_hold(&overlay) {
                warn!(
                    protocol = %gate.id,
                    metric = %action.metric_id(),
                    value = %action.value(),
                    "policy gate rejected action"
                );
                return Err(ProtocolError::PolicyViolation {
                    protocol: gate.id.clone(),
                    metric: action.metric_id().clone(),
                    value: action.value().to_string(),
                });
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Bundles
    // ─────────────────────────────────────────────────────────────────────

    /// Verify a bundle and merge its protocols.
    ///
    /// Nothing is merged unless every check passes.
    pub fn load_bundle(
        &mut self,
        bundle: &ProtocolBundle,
        trust_scope: &Jurisdiction,
    ) -> Result<Vec<String>> {
        // 1-2. Content hash and owner signature
        bundle.verify_integrity()?;

        // 3. Owner scope within the trust scope
        if !trust_scope.encloses(&bundle.owner.scope) {
            return Err(ProtocolError::BundleIntegrity(format!(
                "owner scope {} is outside trust scope {}",
                bundle.owner.scope, trust_scope
            )));
        }

        // 4. Structural validation, assigning default ids
        let mut incoming = Vec::with_capacity(bundle.protocols.len());
        for protocol in &bundle.protocols {
            let mut protocol = protocol.clone();
            if protocol.id.is_empty() {
                protocol.id = format!("{}.{}", bundle.bundle_id.to_hex(), protocol.name);
            }
            protocol.validate()?;
            incoming.push(protocol);
        }

        // 5. Metric ownership against existing protocols and earlier entries
        let mut owners: BTreeMap<MetricId, String> = self
            .protocols
            .values()
            .filter(|p| p.lifecycle != Lifecycle::Revoked)
            .flat_map(|p| p.targets().map(move |m| (m.clone(), p.id.clone())))
            .collect();
        for protocol in &incoming {
            for metric in protocol.targets() {
                match owners.get(metric) {
                    Some(owner) if *owner != protocol.id => {
                        return Err(ProtocolError::Conflict {
                            metric: metric.clone(),
                            protocols: vec![owner.clone(), protocol.id.clone()],
                        });
                    }
                    _ => {
                        owners.insert(metric.clone(), protocol.id.clone());
                    }
                }
            }
        }

        let ids: Vec<String> = incoming.iter().map(|p| p.id.clone()).collect();
        for protocol in incoming {
            self.protocols.insert(protocol.id.clone(), protocol);
        }
        info!(
            bundle = %bundle.bundle_id,
            owner = %bundle.owner.entity_id,
            count = ids.len(),
            "protocol bundle loaded"
        );
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Comparator, Predicate};
    use iron_kernel_authority::IdentityRegistry;
    use iron_kernel_ledger::{AuditLog, LogStatus, MetricDefinition, MetricRegistry, Validator};
    use std::sync::Arc;

    struct Fixture {
        log: Arc<AuditLog>,
        state: StateModel,
        engine: ProtocolEngine,
        system: Keypair,
    }

    fn fixture() -> Fixture {
        let log = Arc::new(AuditLog::new());
        let metrics = Arc::new(MetricRegistry::new());
        for id in ["temp", "fan", "alarm", "expenditure"] {
            metrics.register(MetricDefinition::gauge(id));
        }
        metrics.register(
            MetricDefinition::gauge("valve").validator(Validator::Range { min: 0.0, max: 1.0 }),
        );

        let identities = Arc::new(IdentityRegistry::new());
        let system = Keypair::from_seed(&[0x5e; 32]);
        identities
            .register("system", system.public_key(), true, LogicalTimestamp::ZERO)
            .unwrap();

        let state = StateModel::new(log.clone(), metrics, identities);
        Fixture {
            log,
            state,
            engine: ProtocolEngine::new(),
            system,
        }
    }

    fn set(fx: &mut Fixture, metric: &str, value: f64, time: u64) {
        let action = ActionBuilder::new("system", metric, value)
            .at(time, 0)
            .sign(&fx.system);
        fx.state.apply(&action).unwrap();
    }

    fn cooling(id: &str, target: &str, threshold: f64) -> Protocol {
        Protocol::new(id, id, Category::Habit)
            .when(Predicate::threshold("temp", Comparator::Gt, threshold))
            .then(Rule::mutate(target, 1.0))
    }

    fn activate(engine: &mut ProtocolEngine, protocol: Protocol) -> String {
        let id = engine.propose(protocol).unwrap();
        engine.ratify(&id).unwrap();
        engine.activate(&id).unwrap();
        id
    }

    #[test]
    fn test_lifecycle_enforced() {
        let mut engine = ProtocolEngine::new();
        let id = engine.propose(cooling("p1", "fan", 50.0)).unwrap();

        assert!(matches!(
            engine.activate(&id),
            Err(ProtocolError::InvalidTransition { .. })
        ));
        engine.ratify(&id).unwrap();
        engine.activate(&id).unwrap();
        engine.suspend(&id).unwrap();
        engine.activate(&id).unwrap();
        engine.deprecate(&id).unwrap();
        engine.revoke(&id).unwrap();
        assert!(engine.activate(&id).is_err());
        assert!(matches!(
            engine.ratify("missing"),
            Err(ProtocolError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn test_propose_rejects_duplicates() {
        let mut engine = ProtocolEngine::new();
        engine.propose(cooling("p1", "fan", 50.0)).unwrap();
        assert!(matches!(
            engine.propose(cooling("p1", "alarm", 50.0)),
            Err(ProtocolError::DuplicateProtocol(_))
        ));
    }

    #[test]
    fn test_trigger_applies_mutation_after_time() {
        let mut fx = fixture();
        set(&mut fx, "temp", 80.0, 1);
        set(&mut fx, "fan", 2.0, 1);
        activate(&mut fx.engine, cooling("cool", "fan", 75.0));

        let applied = fx
            .engine
            .evaluate_and_execute(&mut fx.state, &"system".into(), &fx.system, LogicalTimestamp::new(1, 0))
            .unwrap();

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].timestamp, LogicalTimestamp::new(1, 1));
        assert_eq!(fx.state.get("fan"), Some(&MetricValue::from(3.0)));
    }

    #[test]
    fn test_unset_target_starts_from_zero() {
        let mut fx = fixture();
        set(&mut fx, "temp", 80.0, 1);
        activate(&mut fx.engine, cooling("cool", "fan", 75.0));
        fx.engine
            .evaluate_and_execute(&mut fx.state, &"system".into(), &fx.system, LogicalTimestamp::new(1, 0))
            .unwrap();
        assert_eq!(fx.state.get("fan"), Some(&MetricValue::from(1.0)));
    }

    #[test]
    fn test_rules_on_one_metric_accumulate() {
        let mut fx = fixture();
        set(&mut fx, "temp", 90.0, 1);
        activate(
            &mut fx.engine,
            Protocol::new("ramp", "ramp", Category::Habit)
                .when(Predicate::threshold("temp", Comparator::Gt, 75.0))
                .then(Rule::mutate("fan", 1.0))
                .then(Rule::mutate("fan", 2.0)),
        );

        let applied = fx
            .engine
            .evaluate_and_execute(&mut fx.state, &"system".into(), &fx.system, LogicalTimestamp::new(1, 0))
            .unwrap();

        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].value(), &MetricValue::from(1.0));
        assert_eq!(applied[1].value(), &MetricValue::from(3.0));
        assert_eq!(fx.state.get("fan"), Some(&MetricValue::from(3.0)));
        let history = fx.state.get_history("fan");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value, MetricValue::from(1.0));
    }

    #[test]
    fn test_conflict_applies_nothing() {
        let mut fx = fixture();
        set(&mut fx, "temp", 90.0, 1);
        activate(&mut fx.engine, cooling("cool-a", "fan", 75.0));
        activate(&mut fx.engine, cooling("cool-b", "fan", 80.0));
        activate(&mut fx.engine, cooling("siren", "alarm", 85.0));
        let before = fx.log.len();

        let err = fx
            .engine
            .evaluate_and_execute(&mut fx.state, &"system".into(), &fx.system, LogicalTimestamp::new(1, 0))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Conflict { .. }));
        assert!(err.to_string().contains("Protocol Conflict"));

        assert!(fx.state.get("fan").is_none());
        assert!(fx.state.get("alarm").is_none());
        assert_eq!(fx.log.len(), before);
    }

    #[test]
    fn test_failing_rule_aborts_before_any_apply() {
        let mut fx = fixture();
        set(&mut fx, "temp", 90.0, 1);
        activate(&mut fx.engine, cooling("cool", "fan", 75.0));
        // valve + 1.0 starts at 0 -> 1.0 (ok); +2.0 would exceed the range.
        activate(
            &mut fx.engine,
            Protocol::new("open", "open", Category::Habit)
                .when(Predicate::threshold("temp", Comparator::Gt, 75.0))
                .then(Rule::mutate("valve", 2.0)),
        );

        let result = fx.engine.evaluate_and_execute(
            &mut fx.state,
            &"system".into(),
            &fx.system,
            LogicalTimestamp::new(1, 0),
        );
        assert!(result.is_err());
        assert!(fx.state.get("fan").is_none());
        assert_eq!(fx.log.history().last().unwrap().status, LogStatus::Failure);
    }

    #[test]
    fn test_inactive_and_empty_preconditions_do_not_trigger() {
        let mut fx = fixture();
        set(&mut fx, "temp", 90.0, 1);
        fx.engine.propose(cooling("proposed-only", "fan", 10.0)).unwrap();
        activate(
            &mut fx.engine,
            Protocol::new("silent", "silent", Category::Habit).then(Rule::mutate("alarm", 1.0)),
        );
        assert!(fx.engine.evaluate(&fx.state).is_empty());
    }

    #[test]
    fn test_strict_gate_uses_post_action_view() {
        let mut fx = fixture();
        activate(
            &mut fx.engine,
            Protocol::new("PAYMENT_POLICY", "Expenditure Limit", Category::Risk)
                .strict()
                .when(Predicate::threshold("expenditure", Comparator::Lte, 500.0))
                .then(Rule::mutate("expenditure", 0.0)),
        );

        let ok = ActionBuilder::new("system", "expenditure", 200).at(1, 0).sign(&fx.system);
        fx.engine.check_gate(&ok, &fx.state).unwrap();
        fx.state.apply(&ok).unwrap();

        let too_much = ActionBuilder::new("system", "expenditure", 1000).at(2, 0).sign(&fx.system);
        let err = fx.engine.check_gate(&too_much, &fx.state).unwrap_err();
        assert!(err.to_string().contains("Policy Violation"));
        assert_eq!(fx.state.get("expenditure"), Some(&MetricValue::from(200)));

        // Strict protocols never trigger as automations.
        assert!(fx.engine.evaluate(&fx.state).is_empty());

        // Unrelated metrics pass.
        let other = ActionBuilder::new("system", "fan", 1e6).at(3, 0).sign(&fx.system);
        fx.engine.check_gate(&other, &fx.state).unwrap();
    }

    #[test]
    fn test_suspended_gate_is_inert() {
        let fx = fixture();
        let mut engine = ProtocolEngine::new();
        let id = activate(
            &mut engine,
            Protocol::new("cap", "cap", Category::Budget)
                .strict()
                .when(Predicate::threshold("expenditure", Comparator::Lte, 1.0))
                .then(Rule::mutate("expenditure", 0.0)),
        );
        engine.suspend(&id).unwrap();

        let action = ActionBuilder::new("system", "expenditure", 99).sign(&fx.system);
        engine.check_gate(&action, &fx.state).unwrap();
    }
}
