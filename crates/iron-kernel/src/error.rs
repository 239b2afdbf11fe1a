//! Error types for the Kernel.

use thiserror::Error;

use iron_kernel_authority::AuthorityError;
use iron_kernel_core::{BudgetError, LogicalTimestamp, ValidationError};
use iron_kernel_ledger::LedgerError;
use iron_kernel_protocol::ProtocolError;
use iron_kernel_store::StoreError;

use crate::attempt::{AttemptId, AttemptPhase, RejectionKind};
use crate::kernel::KernelPhase;

/// Errors that can occur during Kernel operations.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The kernel has not been booted.
    #[error("Cannot submit attempt in state {0}")]
    Lifecycle(KernelPhase),

    /// An action is older than the newest one the kernel has seen.
    #[error("Temporal integrity breached: {attempted} precedes last seen {last_seen}")]
    TemporalIntegrity {
        attempted: LogicalTimestamp,
        last_seen: LogicalTimestamp,
    },

    #[error("unknown attempt: {0}")]
    UnknownAttempt(AttemptId),

    #[error("{id} is {phase}, expected {expected}")]
    InvalidPhase {
        id: AttemptId,
        phase: AttemptPhase,
        expected: AttemptPhase,
    },

    /// Guard rejected the signature.
    #[error("{0}")]
    InvalidSignature(String),

    /// No covering grant, or a quota breach at guard or commit.
    #[error("{0}")]
    AuthorityViolation(String),

    /// Guard found the initiator unknown or revoked.
    #[error("{0}")]
    IdentityViolation(String),

    /// A strict protocol rejected the attempt.
    #[error("{0}")]
    PolicyViolation(String),

    /// Any other guard rejection.
    #[error("attempt rejected: {0}")]
    Rejected(String),

    /// The budget could not cover the attempt's cost.
    #[error(transparent)]
    BudgetViolation(#[from] BudgetError),

    /// The caller may not administer this scope.
    #[error("{caller} is not authorized for {descriptor}")]
    Unauthorized { caller: String, descriptor: String },

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl KernelError {
    /// Turn a guard rejection into the error `execute` surfaces.
    pub fn from_rejection(kind: RejectionKind, reason: String) -> Self {
        match kind {
            RejectionKind::Signature => KernelError::InvalidSignature(reason),
            RejectionKind::Authority => KernelError::AuthorityViolation(reason),
            RejectionKind::Identity => KernelError::IdentityViolation(reason),
            RejectionKind::Policy => KernelError::PolicyViolation(reason),
            RejectionKind::Lifecycle | RejectionKind::Malformed | RejectionKind::Protocol => {
                KernelError::Rejected(reason)
            }
        }
    }
}

/// Result type for Kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
