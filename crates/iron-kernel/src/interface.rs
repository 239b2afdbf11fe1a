//! Read-mostly facade over a kernel for dashboards and auditors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use iron_kernel_core::{
    Action, ActionId, Blake3Hash, Budget, BudgetKind, EntityId, LogicalTimestamp, MetricValue,
};
use iron_kernel_ledger::{Incident, LogStatus, StateValue};

use crate::error::Result;
use crate::kernel::GovernanceKernel;

/// One committed version of a metric with the evidence that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub value: MetricValue,
    pub timestamp: LogicalTimestamp,
    /// Hash of the audit entry that committed this value.
    pub proof: Blake3Hash,
}

/// A rejected or aborted attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreachReport {
    pub action_id: ActionId,
    pub initiator: EntityId,
    pub status: LogStatus,
    pub reason: Option<String>,
    pub metadata: Option<Value>,
    pub timestamp: LogicalTimestamp,
}

pub struct GovernanceInterface<'k> {
    kernel: &'k mut GovernanceKernel,
}

impl<'k> GovernanceInterface<'k> {
    pub fn new(kernel: &'k mut GovernanceKernel) -> Self {
        Self { kernel }
    }

    /// Current value of a metric.
    pub fn get_truth(&self, metric: &str) -> Option<&MetricValue> {
        self.kernel.state().get(metric)
    }

    /// Every committed version of a metric, oldest first.
    pub fn get_audit_trail(&self, metric: &str) -> Vec<AuditRecord> {
        self.kernel
            .state()
            .get_history(metric)
            .iter()
            .map(|version: &StateValue| AuditRecord {
                value: version.value.clone(),
                timestamp: version.updated_at,
                proof: version.evidence_hash,
            })
            .collect()
    }

    pub fn get_breach_reports(&self) -> Vec<BreachReport> {
        self.kernel
            .audit()
            .breaches()
            .into_iter()
            .map(|entry| BreachReport {
                action_id: entry.action.action_id,
                initiator: entry.action.initiator,
                status: entry.status,
                reason: entry.reason,
                metadata: entry.metadata,
                timestamp: entry.timestamp,
            })
            .collect()
    }

    /// The latest entry for `action_id` and the initiator's preceding activity.
    pub fn reconstruct_incident(&self, action_id: &ActionId) -> Option<Incident> {
        self.kernel
            .audit()
            .reconstruct_incident(action_id, self.kernel.config().incident_window)
    }

    /// Execute under a fresh ENERGY budget.
    pub fn submit(&mut self, action: Action, budget_limit: Option<f64>) -> Result<MetricValue> {
        let limit = budget_limit.unwrap_or(self.kernel.config().default_budget_limit);
        let mut budget = Budget::new(BudgetKind::Energy, limit);
        let committed = self.kernel.execute(action, Some(&mut budget))?;
        Ok(committed.value)
    }
}
