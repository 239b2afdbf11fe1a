//! Error types for the audit log and state model.

use thiserror::Error;

use iron_kernel_authority::AuthorityError;
use iron_kernel_core::{EntityId, LogicalTimestamp, MetricId, ValidationError};

/// Errors that can occur while recording evidence or mutating state.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The metric is not registered.
    #[error("Unknown metric: {0}")]
    UnknownMetric(MetricId),

    /// The metric's kind or validator rejected the value.
    #[error("Invalid Value for {metric}: {reason}")]
    InvalidValue { metric: MetricId, reason: String },

    /// The signature does not verify against the initiator's key.
    #[error("Invalid Signature from {0}")]
    InvalidSignature(EntityId),

    /// Unknown or revoked principal.
    #[error(transparent)]
    Identity(#[from] AuthorityError),

    /// Malformed action.
    #[error("invalid action: {0}")]
    Validation(#[from] ValidationError),

    /// A write arrived earlier than the metric's last committed write.
    #[error("Time Violation: Monotonicity Breach on {metric}: {attempted} < {last}")]
    MonotonicityBreach {
        metric: MetricId,
        last: LogicalTimestamp,
        attempted: LogicalTimestamp,
    },

    /// Audit chain recomputation diverged.
    #[error("audit chain broken at entry {index}")]
    ChainBroken { index: usize },

    /// Per-metric state chain recomputation diverged.
    #[error("state chain for {metric} broken at version {index}")]
    StateChainBroken { metric: MetricId, index: usize },
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
