//! Canonical JSON encoding for deterministic hashing and signing.
//!
//! Rules:
//! - Object keys sorted by byte order, recursively
//! - No insignificant whitespace
//! - Strings escaped exactly as `serde_json` escapes them
//! - Arrays keep their order
//! - Integral floats within the exact-integer range render without a
//!   fraction (`12.0` encodes as `12`), matching ECMAScript number text
//!
//! Two values that are equal as JSON trees produce identical canonical
//! strings regardless of how their maps were constructed. Action ids and
//! bundle ids are hashes over this form.

use serde::Serialize;
use serde_json::{Number, Value};

use crate::crypto::Blake3Hash;
use crate::error::CoreError;

/// Largest integer an f64 represents exactly together with its neighbours.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Encode a JSON value canonically.
pub fn canonical_json(value: &Value) -> String {
    let mut buf = String::new();
    encode_value_to(value, &mut buf);
    buf
}

/// Serialize any value to JSON, then encode it canonically.
pub fn to_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CoreError> {
    let tree = serde_json::to_value(value).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(canonical_json(&tree))
}

/// Blake3 hash of the canonical encoding of a value.
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> Result<Blake3Hash, CoreError> {
    let encoded = to_canonical_json(value)?;
    Ok(Blake3Hash::hash(encoded.as_bytes()))
}

fn encode_value_to(value: &Value, buf: &mut String) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => encode_number_to(n, buf),
        Value::String(s) => encode_string_to(s, buf),
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                encode_value_to(item, buf);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            buf.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                encode_string_to(key, buf);
                buf.push(':');
                encode_value_to(item, buf);
            }
            buf.push('}');
        }
    }
}

fn encode_number_to(n: &Number, buf: &mut String) {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => {
            buf.push_str(&(f as i64).to_string());
        }
        _ => buf.push_str(&n.to_string()),
    }
}

fn encode_string_to(s: &str, buf: &mut String) {
    // Display on a string Value is infallible and applies JSON escaping.
    buf.push_str(&Value::String(s.to_owned()).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map};

    #[test]
    fn test_keys_sorted_recursively() {
        let value = json!({
            "b": 1,
            "a": { "z": true, "m": [ { "y": 1, "x": 2 } ] },
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"m":[{"x":2,"y":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_strings_escaped() {
        let value = json!({ "quote": "he said \"hi\"\n" });
        assert_eq!(canonical_json(&value), r#"{"quote":"he said \"hi\"\n"}"#);
    }

    #[test]
    fn test_scalars() {
        assert_eq!(canonical_json(&json!(null)), "null");
        assert_eq!(canonical_json(&json!(false)), "false");
        assert_eq!(canonical_json(&json!(42)), "42");
        assert_eq!(canonical_json(&json!([])), "[]");
        assert_eq!(canonical_json(&json!({})), "{}");
    }

    #[test]
    fn test_integral_floats_drop_fraction() {
        assert_eq!(canonical_json(&json!(12.0)), "12");
        assert_eq!(canonical_json(&json!(-40.0)), "-40");
        assert_eq!(canonical_json(&json!(-0.0)), "0");
        assert_eq!(canonical_json(&json!(-3.5)), "-3.5");
        assert_eq!(canonical_json(&json!(0.1)), "0.1");
        assert_eq!(canonical_json(&json!({ "value": 12.0 })), canonical_json(&json!({ "value": 12 })));
        // Past the exact-integer range the float text is kept.
        assert_eq!(canonical_json(&json!(1e300)), json!(1e300).to_string());
    }

    #[test]
    fn test_hash_stable_across_construction_order() {
        let a = json!({ "owner": "root", "protocols": [1, 2] });
        let b = json!({ "protocols": [1, 2], "owner": "root" });
        assert_eq!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
    }

    proptest! {
        #[test]
        fn prop_insertion_order_irrelevant(
            pairs in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..12)
        ) {
            let mut forward = Map::new();
            for (k, v) in pairs.iter() {
                forward.insert(k.clone(), json!(v));
            }
            let mut reverse = Map::new();
            for (k, v) in pairs.iter().rev() {
                reverse.insert(k.clone(), json!(v));
            }

            prop_assert_eq!(
                canonical_json(&Value::Object(forward)),
                canonical_json(&Value::Object(reverse))
            );
        }

        #[test]
        fn prop_canonical_form_parses_back(
            pairs in proptest::collection::btree_map("[a-z]{1,6}", "[ -~]{0,12}", 0..8)
        ) {
            let value = serde_json::to_value(&pairs).unwrap();
            let encoded = canonical_json(&value);
            let parsed: Value = serde_json::from_str(&encoded).unwrap();
            prop_assert_eq!(parsed, value);
        }
    }
}
