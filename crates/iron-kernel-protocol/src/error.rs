//! Error types for the protocol engine.

use thiserror::Error;

use iron_kernel_core::{CoreError, MetricId};
use iron_kernel_ledger::LedgerError;

use crate::types::Lifecycle;

/// Errors that can occur while managing or running protocols.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("protocol already registered: {0}")]
    DuplicateProtocol(String),

    #[error("protocol {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: Lifecycle,
        to: Lifecycle,
    },

    /// Structural or category validation failed.
    #[error("invalid protocol {id}: {reason}")]
    Invalid { id: String, reason: String },

    /// Two protocols claim the same target metric.
    #[error("Protocol Conflict: multiple protocols targeting {metric}: {protocols:?}")]
    Conflict {
        metric: MetricId,
        protocols: Vec<String>,
    },

    /// A strict protocol's preconditions fail for the proposed value.
    #[error("Policy Violation: {protocol} forbids {metric} = {value}")]
    PolicyViolation {
        protocol: String,
        metric: MetricId,
        value: String,
    },

    /// Bundle hash, signature or scope mismatch.
    #[error("bundle integrity: {0}")]
    BundleIntegrity(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
