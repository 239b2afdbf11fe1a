//! Protocol definitions: lifecycle, predicates and rules.

use serde::{Deserialize, Serialize};
use std::fmt;

use iron_kernel_core::MetricId;
use iron_kernel_ledger::MetricView;

use crate::error::{ProtocolError, Result};

/// Protocol lifecycle.
///
/// ```text
/// PROPOSED -> RATIFIED -> ACTIVE <-> SUSPENDED
///                           \          /
///                            DEPRECATED
/// any -> REVOKED (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    Proposed,
    Ratified,
    Active,
    Suspended,
    Deprecated,
    Revoked,
}

impl Lifecycle {
    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(&self, to: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (*self, to),
            (Proposed, Ratified)
                | (Ratified, Active)
                | (Suspended, Active)
                | (Active, Suspended)
                | (Active | Suspended, Deprecated)
                | (Proposed | Ratified | Active | Suspended | Deprecated, Revoked)
        )
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Proposed => "PROPOSED",
            Lifecycle::Ratified => "RATIFIED",
            Lifecycle::Active => "ACTIVE",
            Lifecycle::Suspended => "SUSPENDED",
            Lifecycle::Deprecated => "DEPRECATED",
            Lifecycle::Revoked => "REVOKED",
        };
        f.write_str(name)
    }
}

/// What kind of institutional concern a protocol governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Intent,
    Habit,
    Budget,
    Authority,
    Accountability,
    Risk,
}

/// Comparison operator for threshold predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
}

impl Comparator {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparator::Gt => lhs > rhs,
            Comparator::Gte => lhs >= rhs,
            Comparator::Lt => lhs < rhs,
            Comparator::Lte => lhs <= rhs,
            Comparator::Eq => lhs == rhs,
        }
    }
}

/// A condition over current metric values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Predicate {
    /// `metric <operator> value`. Fails closed when the metric is unset or
    /// not a number.
    MetricThreshold {
        #[serde(rename = "metricId")]
        metric_id: MetricId,
        operator: Comparator,
        value: f64,
    },
    /// Trivially true. Does not short-circuit other predicates.
    Always,
}

impl Predicate {
    pub fn threshold(metric: impl Into<MetricId>, operator: Comparator, value: f64) -> Self {
        Predicate::MetricThreshold {
            metric_id: metric.into(),
            operator,
            value,
        }
    }

    pub fn holds(&self, view: &dyn MetricView) -> bool {
        match self {
            Predicate::MetricThreshold {
                metric_id,
                operator,
                value,
            } => view
                .numeric(metric_id.as_str())
                .is_some_and(|current| operator.holds(current, *value)),
            Predicate::Always => true,
        }
    }
}

/// An effect a triggered protocol has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    /// Add `mutation` to the metric's current numeric value.
    MutateMetric {
        #[serde(rename = "metricId")]
        metric_id: MetricId,
        mutation: f64,
    },
}

impl Rule {
    pub fn mutate(metric: impl Into<MetricId>, mutation: f64) -> Self {
        Rule::MutateMetric {
            metric_id: metric.into(),
            mutation,
        }
    }

    pub fn target(&self) -> &MetricId {
        match self {
            Rule::MutateMetric { metric_id, .. } => metric_id,
        }
    }
}

/// A declarative automation or compliance rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    /// Empty in bundles until loaded; then defaults to `<bundleId>.<name>`.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub version: String,
    pub category: Category,
    pub lifecycle: Lifecycle,
    /// Strict protocols gate incoming actions instead of triggering.
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub preconditions: Vec<Predicate>,
    #[serde(default)]
    pub execution: Vec<Rule>,
}

impl Protocol {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: "1.0".to_owned(),
            category,
            lifecycle: Lifecycle::Proposed,
            strict: false,
            preconditions: Vec::new(),
            execution: Vec::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn when(mut self, predicate: Predicate) -> Self {
        self.preconditions.push(predicate);
        self
    }

    pub fn then(mut self, rule: Rule) -> Self {
        self.execution.push(rule);
        self
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    /// Metrics this protocol's rules write.
    pub fn targets(&self) -> impl Iterator<Item = &MetricId> {
        self.execution.iter().map(Rule::target)
    }

    pub fn targets_metric(&self, metric: &str) -> bool {
        self.targets().any(|m| m.as_str() == metric)
    }

    /// Strict AND over all preconditions. An empty list holds vacuously;
    /// callers decide what an empty list means for them.
    pub fn preconditions_hold(&self, view: &dyn MetricView) -> bool {
        self.preconditions.iter().all(|p| p.holds(view))
    }

    /// Structural validation.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ProtocolError::Invalid {
            id: self.id.clone(),
            reason: reason.to_owned(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.version.trim().is_empty() {
            return Err(invalid("version is empty"));
        }
        if self.strict && self.execution.is_empty() {
            return Err(invalid("strict protocol gates no metric"));
        }
        for predicate in &self.preconditions {
            if let Predicate::MetricThreshold {
                metric_id, value, ..
            } = predicate
            {
                if metric_id.is_empty() || !value.is_finite() {
                    return Err(invalid("threshold needs a metric and a finite value"));
                }
            }
        }
        for rule in &self.execution {
            let Rule::MutateMetric {
                metric_id,
                mutation,
            } = rule;
            if metric_id.is_empty() || !mutation.is_finite() {
                return Err(invalid("mutation needs a metric and a finite amount"));
            }
        }
        Ok(())
    }
}
