//! What-if runs over forked state.
//!
//! A simulation forks the state model into a disposable copy that records
//! evidence in a throwaway log, applies the hypothetical mutation there,
//! and reports the projected value, a linear forecast, and which
//! automations would trigger. The authoritative ledger is never written.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use iron_kernel_core::{
    ActionBuilder, Budget, Ed25519Signature, LogicalTimestamp, MetricId, MetricValue,
};
use iron_kernel_ledger::{AuditLog, MetricView, StateModel};
use iron_kernel_protocol::ProtocolEngine;

use crate::config::SimulationConfig;
use crate::error::Result;

/// Linear extrapolation over a metric's history.
pub struct TrendAnalyzer<'a> {
    state: &'a StateModel,
}

impl<'a> TrendAnalyzer<'a> {
    pub fn new(state: &'a StateModel) -> Self {
        Self { state }
    }

    /// `last + (last - previous) * horizon` over the two newest versions.
    /// Zero when there are fewer than two numeric points.
    pub fn forecast(&self, metric: &str, horizon: f64) -> f64 {
        let history = self.state.get_history(metric);
        let [.., previous, last] = history else {
            return 0.0;
        };
        match (previous.value.as_f64(), last.value.as_f64()) {
            (Some(p1), Some(p2)) => p2 + (p2 - p1) * horizon,
            _ => 0.0,
        }
    }
}

/// A hypothetical change: add `mutation` to a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimAction {
    pub target_metric_id: MetricId,
    pub mutation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOutcome {
    pub projected: MetricValue,
    pub forecast: f64,
    /// Automations that would trigger against the projected state.
    pub triggered: Vec<String>,
}

pub struct SimulationEngine {
    config: SimulationConfig,
}

impl SimulationEngine {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Charge the run's cost, then play `sim` out on a fork of `state`.
    pub fn run(
        &self,
        state: &StateModel,
        protocols: &ProtocolEngine,
        sim: &SimAction,
        budget: &mut Budget,
    ) -> Result<SimulationOutcome> {
        budget.consume(self.config.cost)?;

        let mut fork = state.fork(Arc::new(AuditLog::new()));
        let metric = sim.target_metric_id.as_str();
        let current = fork.numeric(metric).unwrap_or(0.0);
        let at = fork
            .get_state(metric)
            .map_or(LogicalTimestamp::new(0, 1), |s| s.updated_at.next_logical());

        // The fork trusts the hypothetical action; nothing verifies it.
        let action = ActionBuilder::new("sim", sim.target_metric_id.clone(), current + sim.mutation)
            .timestamp(at)
            .with_signature(Ed25519Signature::ZERO);
        let projected = fork.apply_trusted(&action)?.value;

        let forecast = TrendAnalyzer::new(&fork).forecast(metric, self.config.horizon);
        let triggered = protocols
            .evaluate(&fork)
            .into_iter()
            .map(|p| p.id.clone())
            .collect();

        debug!(metric, projected = %projected, forecast, "simulation run");
        Ok(SimulationOutcome {
            projected,
            forecast,
            triggered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iron_kernel_authority::IdentityRegistry;
    use iron_kernel_core::{BudgetKind, Keypair};
    use iron_kernel_ledger::{MetricDefinition, MetricRegistry};
    use iron_kernel_protocol::{Category, Comparator, Predicate, Protocol, Rule};

    fn state_with_load(values: &[f64]) -> (Arc<AuditLog>, StateModel) {
        let log = Arc::new(AuditLog::new());
        let metrics = Arc::new(MetricRegistry::new());
        metrics.register(MetricDefinition::gauge("system.load"));
        let mut state = StateModel::new(log.clone(), metrics, Arc::new(IdentityRegistry::new()));

        let key = Keypair::from_seed(&[3; 32]);
        for (t, v) in values.iter().enumerate() {
            let action = ActionBuilder::new("admin", "system.load", *v)
                .at(t as u64 + 1, 0)
                .sign(&key);
            state.apply_trusted(&action).unwrap();
        }
        (log, state)
    }

    #[test]
    fn test_forecast_needs_two_points() {
        let (_, state) = state_with_load(&[10.0]);
        assert_eq!(TrendAnalyzer::new(&state).forecast("system.load", 1.0), 0.0);

        let (_, state) = state_with_load(&[10.0, 14.0]);
        assert_eq!(TrendAnalyzer::new(&state).forecast("system.load", 1.0), 18.0);
        assert_eq!(TrendAnalyzer::new(&state).forecast("system.load", 2.5), 24.0);
    }

    #[test]
    fn test_simulation_leaves_ledger_untouched() {
        let (log, state) = state_with_load(&[10.0]);
        let engine = SimulationEngine::new(SimulationConfig::default());
        let mut budget = Budget::new(BudgetKind::Attention, 5.0);

        let outcome = engine
            .run(
                &state,
                &ProtocolEngine::new(),
                &SimAction {
                    target_metric_id: "system.load".into(),
                    mutation: 10.0,
                },
                &mut budget,
            )
            .unwrap();

        assert_eq!(outcome.projected, MetricValue::from(20.0));
        assert_eq!(outcome.forecast, 30.0);
        assert_eq!(budget.used(), 1.0);

        assert_eq!(state.numeric("system.load"), Some(10.0));
        assert_eq!(state.get_history("system.load").len(), 1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_simulation_reports_triggers() {
        let (_, state) = state_with_load(&[60.0]);
        let mut protocols = ProtocolEngine::new();
        let id = protocols
            .propose(
                Protocol::new("shed", "Shed load", Category::Habit)
                    .when(Predicate::threshold("system.load", Comparator::Gt, 80.0))
                    .then(Rule::mutate("system.fan", 1.0)),
            )
            .unwrap();
        protocols.ratify(&id).unwrap();
        protocols.activate(&id).unwrap();

        let engine = SimulationEngine::new(SimulationConfig::default());
        let mut budget = Budget::new(BudgetKind::Energy, 10.0);
        let sim = SimAction {
            target_metric_id: "system.load".into(),
            mutation: 30.0,
        };
        let outcome = engine.run(&state, &protocols, &sim, &mut budget).unwrap();
        assert_eq!(outcome.triggered, vec![id]);
        assert!(protocols.evaluate(&state).is_empty());
    }

    #[test]
    fn test_simulation_requires_budget() {
        let (_, state) = state_with_load(&[1.0]);
        let engine = SimulationEngine::new(SimulationConfig::default());
        let mut budget = Budget::new(BudgetKind::Energy, 0.5);
        let sim = SimAction {
            target_metric_id: "system.load".into(),
            mutation: 1.0,
        };
        assert!(engine
            .run(&state, &ProtocolEngine::new(), &sim, &mut budget)
            .is_err());
    }
}
