//! Tagged metric values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The value carried by a metric: a number, a boolean, or text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// The numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetricValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetricValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Magnitude charged against a grant's quota.
    ///
    /// Numbers count by magnitude; booleans and text count as one unit.
    pub fn quota_amount(&self) -> f64 {
        self.as_f64().map_or(1.0, f64::abs)
    }

    /// JSON form used in canonical payloads and audit metadata.
    ///
    /// Non-finite numbers become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Bool(b) => Value::Bool(*b),
            MetricValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetricValue::Text(s) => Value::String(s.clone()),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            MetricValue::Bool(_) => "boolean",
            MetricValue::Number(_) => "number",
            MetricValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Bool(b) => write!(f, "{b}"),
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(n: f64) -> Self {
        MetricValue::Number(n)
    }
}

impl From<i64> for MetricValue {
    fn from(n: i64) -> Self {
        MetricValue::Number(n as f64)
    }
}

impl From<i32> for MetricValue {
    fn from(n: i32) -> Self {
        MetricValue::Number(f64::from(n))
    }
}

impl From<bool> for MetricValue {
    fn from(b: bool) -> Self {
        MetricValue::Bool(b)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_owned())
    }
}

impl From<String> for MetricValue {
    fn from(s: String) -> Self {
        MetricValue::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_serde() {
        let n: MetricValue = serde_json::from_str("42.5").unwrap();
        assert_eq!(n, MetricValue::Number(42.5));

        let b: MetricValue = serde_json::from_str("true").unwrap();
        assert_eq!(b, MetricValue::Bool(true));

        let t: MetricValue = serde_json::from_str("\"ok\"").unwrap();
        assert_eq!(t, MetricValue::Text("ok".into()));

        let int: MetricValue = serde_json::from_str("7").unwrap();
        assert_eq!(int.as_f64(), Some(7.0));
    }

    #[test]
    fn test_quota_amount() {
        assert_eq!(MetricValue::from(90).quota_amount(), 90.0);
        assert_eq!(MetricValue::from(-3.5).quota_amount(), 3.5);
        assert_eq!(MetricValue::from(true).quota_amount(), 1.0);
        assert_eq!(MetricValue::from("on").quota_amount(), 1.0);
    }

    #[test]
    fn test_non_finite_json_is_null() {
        assert_eq!(MetricValue::Number(f64::NAN).to_json(), Value::Null);
        assert_eq!(MetricValue::Number(1.5).to_json(), serde_json::json!(1.5));
    }
}
