//! Metric definitions and the registry that validates proposed values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use iron_kernel_core::{MetricId, MetricPayload, MetricValue};

use crate::error::{LedgerError, Result};

/// The shape of values a metric holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricKind {
    /// Non-negative number.
    Counter,
    /// Any finite number.
    Gauge,
    Boolean,
    Text,
}

impl MetricKind {
    fn check(&self, value: &MetricValue) -> std::result::Result<(), String> {
        match (self, value) {
            (MetricKind::Counter, MetricValue::Number(n)) if *n < 0.0 => {
                Err(format!("counter cannot be negative ({n})"))
            }
            (MetricKind::Counter | MetricKind::Gauge, MetricValue::Number(_))
            | (MetricKind::Boolean, MetricValue::Bool(_))
            | (MetricKind::Text, MetricValue::Text(_)) => Ok(()),
            (kind, value) => Err(format!("{kind:?} metric cannot hold a {}", value.kind_name())),
        }
    }
}

/// Predicate closure over a proposed value.
pub type ValidatorFn = Arc<dyn Fn(&MetricValue) -> bool + Send + Sync>;

/// Extra constraint on a metric's values, applied after the kind check.
#[derive(Clone)]
pub enum Validator {
    /// Inclusive numeric range.
    Range { min: f64, max: f64 },
    NonNegative,
    /// Text must be one of the listed options.
    OneOf(Vec<String>),
    Custom(ValidatorFn),
}

impl Validator {
    pub fn custom(f: impl Fn(&MetricValue) -> bool + Send + Sync + 'static) -> Self {
        Validator::Custom(Arc::new(f))
    }

    pub fn accepts(&self, value: &MetricValue) -> bool {
        match self {
            Validator::Range { min, max } => value.as_f64().is_some_and(|n| n >= *min && n <= *max),
            Validator::NonNegative => value.as_f64().is_some_and(|n| n >= 0.0),
            Validator::OneOf(options) => value
                .as_text()
                .is_some_and(|s| options.iter().any(|o| o == s)),
            Validator::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Range { min, max } => write!(f, "Range({min}..={max})"),
            Validator::NonNegative => f.write_str("NonNegative"),
            Validator::OneOf(options) => write!(f, "OneOf({options:?})"),
            Validator::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A registered metric.
#[derive(Debug, Clone)]
pub struct MetricDefinition {
    pub id: MetricId,
    pub description: String,
    pub kind: MetricKind,
    pub unit: Option<String>,
    pub validator: Option<Validator>,
}

impl MetricDefinition {
    pub fn new(id: impl Into<MetricId>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind,
            unit: None,
            validator: None,
        }
    }

    pub fn gauge(id: impl Into<MetricId>) -> Self {
        Self::new(id, MetricKind::Gauge)
    }

    pub fn counter(id: impl Into<MetricId>) -> Self {
        Self::new(id, MetricKind::Counter)
    }

    pub fn boolean(id: impl Into<MetricId>) -> Self {
        Self::new(id, MetricKind::Boolean)
    }

    pub fn text(id: impl Into<MetricId>) -> Self {
        Self::new(id, MetricKind::Text)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Check a proposed value against kind and validator.
    pub fn check(&self, value: &MetricValue) -> Result<()> {
        self.kind.check(value).map_err(|reason| LedgerError::InvalidValue {
            metric: self.id.clone(),
            reason,
        })?;

        if let Some(validator) = &self.validator {
            if !validator.accepts(value) {
                return Err(LedgerError::InvalidValue {
                    metric: self.id.clone(),
                    reason: format!("{value} rejected by {validator:?}"),
                });
            }
        }
        Ok(())
    }
}

/// Registry of metric definitions.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    metrics: RwLock<HashMap<MetricId, MetricDefinition>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a definition.
    pub fn register(&self, definition: MetricDefinition) {
        debug!(metric = %definition.id, kind = ?definition.kind, "registering metric");
        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(definition.id.clone(), definition);
    }

    pub fn get(&self, id: &str) -> Option<MetricDefinition> {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<MetricId> {
        let mut ids: Vec<MetricId> = self
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// The metric must exist and accept the value.
    pub fn validate(&self, payload: &MetricPayload) -> Result<()> {
        let definition = self
            .get(payload.metric_id.as_str())
            .ok_or_else(|| LedgerError::UnknownMetric(payload.metric_id.clone()))?;
        definition.check(&payload.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_metric() {
        let registry = MetricRegistry::new();
        let err = registry.validate(&MetricPayload::new("ghost", 1)).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownMetric(_)));
        assert!(err.to_string().contains("Unknown metric: ghost"));
    }

    #[test]
    fn test_kind_mismatch() {
        let registry = MetricRegistry::new();
        registry.register(MetricDefinition::boolean("alarm"));
        registry.register(MetricDefinition::counter("requests"));

        assert!(registry.validate(&MetricPayload::new("alarm", true)).is_ok());
        assert!(registry.validate(&MetricPayload::new("alarm", 1)).is_err());
        assert!(registry.validate(&MetricPayload::new("requests", 3)).is_ok());
        assert!(registry.validate(&MetricPayload::new("requests", -3)).is_err());
    }

    #[test]
    fn test_builtin_validators() {
        let registry = MetricRegistry::new();
        registry.register(
            MetricDefinition::gauge("load").validator(Validator::Range { min: 0.0, max: 100.0 }),
        );
        registry.register(
            MetricDefinition::text("mode").validator(Validator::OneOf(vec!["eco".into(), "max".into()])),
        );

        assert!(registry.validate(&MetricPayload::new("load", 100)).is_ok());
        assert!(registry.validate(&MetricPayload::new("load", 101)).is_err());
        assert!(registry.validate(&MetricPayload::new("mode", "eco")).is_ok());
        assert!(registry.validate(&MetricPayload::new("mode", "turbo")).is_err());
    }

    #[test]
    fn test_custom_validator() {
        let registry = MetricRegistry::new();
        registry.register(
            MetricDefinition::gauge("even").validator(Validator::custom(|v| {
                v.as_f64().is_some_and(|n| n % 2.0 == 0.0)
            })),
        );
        assert!(registry.validate(&MetricPayload::new("even", 4)).is_ok());

        let err = registry.validate(&MetricPayload::new("even", 3)).unwrap_err();
        assert!(err.to_string().starts_with("Invalid Value for even"));
    }

    #[test]
    fn test_ids_sorted() {
        let registry = MetricRegistry::new();
        registry.register(MetricDefinition::gauge("b"));
        registry.register(MetricDefinition::gauge("a"));
        assert_eq!(registry.ids(), vec![MetricId::from("a"), MetricId::from("b")]);
    }
}
