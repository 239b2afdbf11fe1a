//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use iron_kernel_core::{
    Action, ActionBuilder, EntityId, Jurisdiction, Keypair, LogicalTimestamp, MetricValue,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a logical timestamp away from the numeric limits.
pub fn timestamp() -> impl Strategy<Value = LogicalTimestamp> {
    (0u64..=u64::MAX / 2, 0u64..1_000).prop_map(|(time, logical)| LogicalTimestamp::new(time, logical))
}

/// One lowercase scope segment.
pub fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}".prop_map(String::from)
}

/// A dotted scope path of one to four segments.
pub fn scope_path() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 1..=4)
}

/// A jurisdiction, sometimes the wildcard.
pub fn jurisdiction() -> impl Strategy<Value = Jurisdiction> {
    prop_oneof![
        1 => Just(Jurisdiction::wildcard()),
        9 => scope_path().prop_map(|parts| Jurisdiction::new(parts.join("."))),
    ]
}

/// A metric value of any kind. Numbers are finite.
pub fn metric_value() -> impl Strategy<Value = MetricValue> {
    prop_oneof![
        (-1e9f64..1e9).prop_map(MetricValue::Number),
        any::<bool>().prop_map(MetricValue::Bool),
        "[a-zA-Z0-9 ]{0,16}".prop_map(MetricValue::Text),
    ]
}

/// Arbitrary JSON with nested objects, for canonicalization properties.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        "[a-z\"\\\\ ]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z]{1,6}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Parameters for generating an action.
#[derive(Debug, Clone)]
pub struct ActionParams {
    pub keypair: Keypair,
    pub initiator: EntityId,
    pub metric: String,
    pub value: MetricValue,
    pub timestamp: LogicalTimestamp,
}

impl Arbitrary for ActionParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (keypair(), segment(), scope_path(), metric_value(), timestamp())
            .prop_map(|(keypair, initiator, path, value, timestamp)| ActionParams {
                keypair,
                initiator: EntityId::new(initiator),
                metric: path.join("."),
                value,
                timestamp,
            })
            .boxed()
    }
}

/// Build and sign an action from parameters.
pub fn action_from_params(params: &ActionParams) -> Action {
    ActionBuilder::new(
        params.initiator.clone(),
        params.metric.as_str(),
        params.value.clone(),
    )
    .timestamp(params.timestamp)
    .sign(&params.keypair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iron_kernel_core::{canonical_json, validate_action};

    proptest! {
        #[test]
        fn generated_actions_validate(params: ActionParams) {
            let action = action_from_params(&params);
            prop_assert!(validate_action(&action, &params.keypair.public_key()).is_ok());
            prop_assert_eq!(action.compute_id(), action.action_id);
        }

        #[test]
        fn canonical_json_ignores_insertion_order(value in json_value()) {
            let reversed = reverse_keys(&value);
            prop_assert_eq!(canonical_json(&value), canonical_json(&reversed));
        }
    }

    fn reverse_keys(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = Map::new();
                for (k, v) in map.iter().rev() {
                    out.insert(k.clone(), reverse_keys(v));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(reverse_keys).collect()),
            other => other.clone(),
        }
    }
}
