//! Action validation: structural checks and signature verification.

use crate::action::Action;
use crate::crypto::Ed25519PublicKey;
use crate::error::ValidationError;

/// Validate an action's structure (without any ledger context).
///
/// This performs:
/// - Metric id presence
/// - Finite numeric values
/// - Content id recomputation
/// - Expiry relative to the action's own timestamp
pub fn validate_action_structure(action: &Action) -> Result<(), ValidationError> {
    // 1. Metric id must be present
    if action.metric_id().is_empty() {
        return Err(ValidationError::MissingMetricId);
    }

    // 2. Numbers must be finite
    if let Some(n) = action.value().as_f64() {
        if !n.is_finite() {
            return Err(ValidationError::NonFiniteValue(action.metric_id().to_string()));
        }
    }

    // 3. Declared id must match content
    let derived = action.compute_id();
    if derived != action.action_id {
        return Err(ValidationError::ActionIdMismatch {
            declared: action.action_id,
            derived,
        });
    }

    // 4. An action cannot be issued after it expires
    if action.is_expired_at(action.timestamp) {
        return Err(ValidationError::Expired {
            timestamp: action.timestamp,
            expires_at: action.expires_at,
        });
    }

    Ok(())
}

/// Full validation: structure plus signature against the initiator's key.
pub fn validate_action(action: &Action, key: &Ed25519PublicKey) -> Result<(), ValidationError> {
    validate_action_structure(action)?;
    action.verify_signature(key)?;
    Ok(())
}
