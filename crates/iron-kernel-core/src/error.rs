//! Error types for the Iron Kernel Core.

use thiserror::Error;

use crate::action::ActionId;

/// Core errors that can occur while building or checking primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid logical timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Validation errors for action structure and signatures.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid Signature")]
    SignatureFailed,

    #[error("action id mismatch: declared {declared}, derived {derived}")]
    ActionIdMismatch { declared: ActionId, derived: ActionId },

    #[error("missing metric id")]
    MissingMetricId,

    #[error("metric value for {0} is not a finite number")]
    NonFiniteValue(String),

    #[error("action expired: timestamp {timestamp} is past expiry {expires_at}")]
    Expired {
        timestamp: crate::types::LogicalTimestamp,
        expires_at: crate::types::LogicalTimestamp,
    },

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed
            }
            CoreError::InvalidTimestamp(msg)
            | CoreError::EncodingError(msg)
            | CoreError::DecodingError(msg) => ValidationError::StructuralError(msg),
        }
    }
}

/// Errors raised when consuming a [`Budget`](crate::budget::Budget).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetError {
    #[error("Budget Violation: {kind} requested {requested}, remaining {remaining}")]
    Exhausted {
        kind: String,
        requested: f64,
        remaining: f64,
    },

    #[error("Budget Violation: invalid amount {0}")]
    InvalidAmount(f64),
}
