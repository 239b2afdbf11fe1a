//! Golden test vectors for the canonical action strings.
//!
//! Builders and verifiers in any implementation must produce these strings
//! bit-for-bit:
//!
//! ```text
//! id preimage = initiator ":" canonical(payload) ":" timestamp ":" expires_at
//! signed data = hex(blake3(id preimage)) ":" id preimage
//! ```

use iron_kernel_core::{
    Action, ActionBuilder, ActionId, Blake3Hash, Keypair, LogicalTimestamp, MetricValue,
};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Seed for deterministic key generation.
    pub seed: [u8; 32],
    pub initiator: &'static str,
    pub metric: &'static str,
    pub value: MetricValue,
    pub timestamp: LogicalTimestamp,
    pub expires_at: LogicalTimestamp,
    /// Expected canonical payload text.
    pub canonical_payload: &'static str,
    /// Expected text hashed into the action id.
    pub id_preimage: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "gauge write",
            seed: [0x42; 32],
            initiator: "admin",
            metric: "system.load",
            value: MetricValue::Number(12.0),
            timestamp: LogicalTimestamp::new(1, 0),
            expires_at: LogicalTimestamp::ZERO,
            canonical_payload: r#"{"metricId":"system.load","value":12}"#,
            id_preimage: r#"admin:{"metricId":"system.load","value":12}:1:0:0:0"#,
        },
        GoldenVector {
            name: "fractional negative with expiry",
            seed: [0x42; 32],
            initiator: "bot",
            metric: "temp",
            value: MetricValue::Number(-3.5),
            timestamp: LogicalTimestamp::new(1736870400, 7),
            expires_at: LogicalTimestamp::new(1736870460, 0),
            canonical_payload: r#"{"metricId":"temp","value":-3.5}"#,
            id_preimage: r#"bot:{"metricId":"temp","value":-3.5}:1736870400:7:1736870460:0"#,
        },
        GoldenVector {
            name: "boolean flag",
            seed: [0x00; 32],
            initiator: "ops",
            metric: "alarm",
            value: MetricValue::Bool(true),
            timestamp: LogicalTimestamp::new(0, 1),
            expires_at: LogicalTimestamp::ZERO,
            canonical_payload: r#"{"metricId":"alarm","value":true}"#,
            id_preimage: r#"ops:{"metricId":"alarm","value":true}:0:1:0:0"#,
        },
        GoldenVector {
            name: "text with quote",
            seed: [0x01; 32],
            initiator: "ops",
            metric: "mode",
            value: MetricValue::Text("eco \"night\"".into()),
            timestamp: LogicalTimestamp::new(2, 0),
            expires_at: LogicalTimestamp::ZERO,
            canonical_payload: r#"{"metricId":"mode","value":"eco \"night\""}"#,
            id_preimage: r#"ops:{"metricId":"mode","value":"eco \"night\""}:2:0:0:0"#,
        },
    ]
}

/// Build and sign the action a vector describes.
pub fn generate_action_from_vector(vector: &GoldenVector) -> Action {
    let keypair = Keypair::from_seed(&vector.seed);
    ActionBuilder::new(vector.initiator, vector.metric, vector.value.clone())
        .timestamp(vector.timestamp)
        .expires_at(vector.expires_at)
        .sign(&keypair)
}

/// Check one vector, describing the first mismatch.
pub fn verify_vector(vector: &GoldenVector) -> Result<(), String> {
    let action = generate_action_from_vector(vector);

    let payload = action.payload.canonical();
    if payload != vector.canonical_payload {
        return Err(format!(
            "{}: canonical payload {payload} != {}",
            vector.name, vector.canonical_payload
        ));
    }

    let expected_id = ActionId::from(Blake3Hash::hash(vector.id_preimage.as_bytes()));
    if action.action_id != expected_id {
        return Err(format!(
            "{}: action id {} != {}",
            vector.name,
            action.action_id.to_hex(),
            expected_id.to_hex()
        ));
    }

    let signed = format!("{}:{}", expected_id.to_hex(), vector.id_preimage);
    if action.signing_string() != signed {
        return Err(format!(
            "{}: signing string {} != {signed}",
            vector.name,
            action.signing_string()
        ));
    }

    let key = Keypair::from_seed(&vector.seed).public_key();
    action
        .verify_signature(&key)
        .map_err(|e| format!("{}: {e}", vector.name))
}

/// Check every vector.
pub fn verify_all_vectors() -> Result<(), String> {
    all_vectors().iter().try_for_each(verify_vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors() {
        verify_all_vectors().unwrap();
    }

    #[test]
    fn test_signature_is_deterministic() {
        for vector in all_vectors() {
            let a = generate_action_from_vector(&vector);
            let b = generate_action_from_vector(&vector);
            assert_eq!(a.signature, b.signature, "{}", vector.name);
        }
    }
}
