//! The state model: current value and history per metric.
//!
//! Every committed value is linked twice: to the audit entry that produced
//! it (`evidence_hash`), and to the metric's previous value through
//! `state_hash = blake3(previous_state_hash || evidence_hash)`. The second
//! chain lets a verifier check one metric without replaying the whole log.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use iron_kernel_authority::IdentityRegistry;
use iron_kernel_core::{
    validate_action_structure, Action, Blake3Hash, LogicalTimestamp, MetricId, MetricValue,
};

use crate::audit::{AuditLog, LogStatus};
use crate::error::{LedgerError, Result};
use crate::metric::MetricRegistry;

/// Narrow capability the state model needs from an evidence log.
pub trait EvidenceSink: Send + Sync {
    /// Record an outcome and return the evidence id.
    fn record(
        &self,
        action: &Action,
        status: LogStatus,
        reason: Option<String>,
        metadata: Option<Value>,
    ) -> Blake3Hash;
}

impl EvidenceSink for AuditLog {
    fn record(
        &self,
        action: &Action,
        status: LogStatus,
        reason: Option<String>,
        metadata: Option<Value>,
    ) -> Blake3Hash {
        self.append(action, status, reason, metadata).hash
    }
}

/// Read access to metric values, for predicate evaluation.
pub trait MetricView {
    fn value_of(&self, metric: &str) -> Option<MetricValue>;

    /// Current numeric value; `None` if unset or not a number.
    fn numeric(&self, metric: &str) -> Option<f64> {
        self.value_of(metric).and_then(|v| v.as_f64())
    }
}

/// One version of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateValue {
    pub value: MetricValue,
    pub updated_at: LogicalTimestamp,
    pub evidence_hash: Blake3Hash,
    pub state_hash: Blake3Hash,
}

/// Current metric values, their histories, and the rules for changing them.
pub struct StateModel {
    sink: Arc<dyn EvidenceSink>,
    metrics: Arc<MetricRegistry>,
    identities: Arc<IdentityRegistry>,
    current: HashMap<MetricId, StateValue>,
    history: HashMap<MetricId, Vec<StateValue>>,
}

impl StateModel {
    pub fn new(
        sink: Arc<dyn EvidenceSink>,
        metrics: Arc<MetricRegistry>,
        identities: Arc<IdentityRegistry>,
    ) -> Self {
        Self {
            sink,
            metrics,
            identities,
            current: HashMap::new(),
            history: HashMap::new(),
        }
    }

    pub fn metrics(&self) -> &Arc<MetricRegistry> {
        &self.metrics
    }

    pub fn identities(&self) -> &Arc<IdentityRegistry> {
        &self.identities
    }

    // ─────────────────────────────────────────────────────────────────────
    // Checks
    // ─────────────────────────────────────────────────────────────────────

    /// The metric must be registered and accept the value.
    pub fn validate_mutation(&self, action: &Action) -> Result<()> {
        self.metrics.validate(&action.payload)
    }

    /// `at` must not precede the metric's last committed timestamp.
    pub fn check_monotonic(&self, metric: &MetricId, at: LogicalTimestamp) -> Result<()> {
        if let Some(last) = self.current.get(metric) {
            if at < last.updated_at {
                return Err(LedgerError::MonotonicityBreach {
                    metric: metric.clone(),
                    last: last.updated_at,
                    attempted: at,
                });
            }
        }
        Ok(())
    }

    /// Everything [`apply_trusted`](Self::apply_trusted) checks, without
    /// mutating anything.
    pub fn preflight(&self, action: &Action) -> Result<()> {
        self.validate_mutation(action)?;
        self.check_monotonic(action.metric_id(), action.timestamp)
    }

    /// Authenticity checks for the full apply path.
    pub fn verify(&self, action: &Action) -> Result<()> {
        let principal = self.identities.require_active(action.initiator.as_str())?;
        validate_action_structure(action)?;
        action
            .verify_signature(&principal.public_key)
            .map_err(|_| LedgerError::InvalidSignature(action.initiator.clone()))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────

    /// Apply an action whose authenticity is already established.
    ///
    /// This is the only path that mutates state. On error nothing is
    /// recorded; callers that need failure evidence record it themselves.
    pub fn apply_trusted(&mut self, action: &Action) -> Result<StateValue> {
        self.preflight(action)?;

        let metric = action.metric_id().clone();
        let evidence_hash = self.sink.record(action, LogStatus::Success, None, None);
        let previous_state_hash = self
            .current
            .get(&metric)
            .map_or(Blake3Hash::ZERO, |s| s.state_hash);

        let value = StateValue {
            value: action.value().clone(),
            updated_at: action.timestamp,
            evidence_hash,
            state_hash: chain_state(&previous_state_hash, &evidence_hash),
        };

        debug!(
            metric = %metric,
            value = %value.value,
            at = %value.updated_at,
            "metric updated"
        );
        self.current.insert(metric.clone(), value.clone());
        self.history.entry(metric).or_default().push(value.clone());
        Ok(value)
    }

    /// Verify, then apply. Any failure is recorded as FAILURE before it is
    /// returned.
    pub fn apply(&mut self, action: &Action) -> Result<StateValue> {
        let outcome = self.verify(action).and_then(|()| self.apply_trusted(action));
        if let Err(err) = &outcome {
            warn!(action = %action.action_id, error = %err, "state transition failed");
            self.sink
                .record(action, LogStatus::Failure, Some(err.to_string()), None);
        }
        outcome
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    pub fn get(&self, metric: &str) -> Option<&MetricValue> {
        self.current.get(metric).map(|s| &s.value)
    }

    pub fn get_state(&self, metric: &str) -> Option<&StateValue> {
        self.current.get(metric)
    }

    /// All versions of a metric, oldest first. Empty for unknown metrics.
    pub fn get_history(&self, metric: &str) -> &[StateValue] {
        self.history.get(metric).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Recompute a metric's state chain from genesis.
    pub fn verify_metric_chain(&self, metric: &str) -> Result<()> {
        let mut previous = Blake3Hash::ZERO;
        for (index, version) in self.get_history(metric).iter().enumerate() {
            if chain_state(&previous, &version.evidence_hash) != version.state_hash {
                return Err(LedgerError::StateChainBroken {
                    metric: MetricId::from(metric),
                    index,
                });
            }
            previous = version.state_hash;
        }
        Ok(())
    }

    /// A disposable copy seeded with current values and histories, writing
    /// evidence to `sink` instead of this model's log.
    pub fn fork(&self, sink: Arc<dyn EvidenceSink>) -> StateModel {
        StateModel {
            sink,
            metrics: Arc::clone(&self.metrics),
            identities: Arc::clone(&self.identities),
            current: self.current.clone(),
            history: self.history.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn history_mut(&mut self, metric: &str) -> Option<&mut Vec<StateValue>> {
        self.history.get_mut(metric)
    }
}

impl MetricView for StateModel {
    fn value_of(&self, metric: &str) -> Option<MetricValue> {
        self.get(metric).cloned()
    }
}

fn chain_state(previous: &Blake3Hash, evidence: &Blake3Hash) -> Blake3Hash {
    Blake3Hash::hash_parts(&[previous.as_bytes(), evidence.as_bytes()])
}
