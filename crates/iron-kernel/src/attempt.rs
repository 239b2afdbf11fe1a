//! Attempt records: one submit → guard → commit cycle for one action.

use serde::{Deserialize, Serialize};
use std::fmt;

use iron_kernel_core::{Action, EntityId};

/// Kernel-assigned attempt identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// Where an attempt is in its lifecycle.
///
/// ```text
/// PENDING -> GUARDED -> COMMITTED
///    |          \-----> ABORTED
///    \--------> REJECTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptPhase {
    Pending,
    Guarded,
    Committed,
    Rejected,
    Aborted,
}

impl AttemptPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptPhase::Committed | AttemptPhase::Rejected | AttemptPhase::Aborted
        )
    }
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptPhase::Pending => "PENDING",
            AttemptPhase::Guarded => "GUARDED",
            AttemptPhase::Committed => "COMMITTED",
            AttemptPhase::Rejected => "REJECTED",
            AttemptPhase::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// A kernel-side record of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub attempt_id: AttemptId,
    pub initiator: EntityId,
    pub protocol_id: Option<String>,
    pub action: Action,
    pub cost_estimate: f64,
    pub phase: AttemptPhase,
    /// The grant that authorized the attempt, once guarded.
    pub grant_id: Option<String>,
    /// Why the attempt was rejected or aborted.
    pub reason: Option<String>,
}

/// Which check a rejected attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionKind {
    /// Unknown attempt, or not PENDING.
    Lifecycle,
    /// Unknown or revoked principal.
    Identity,
    /// Structurally invalid action.
    Malformed,
    Signature,
    /// No covering grant, or a quota breach.
    Authority,
    /// A strict protocol forbids the resulting state.
    Policy,
    /// The named protocol is missing or not active.
    Protocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardStatus {
    Accepted,
    Rejected,
}

/// Structured result of guarding an attempt. Guarding never fails with an
/// error; expected rejections come back here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardOutcome {
    pub status: GuardStatus,
    pub kind: Option<RejectionKind>,
    pub reason: Option<String>,
}

impl GuardOutcome {
    pub fn accepted() -> Self {
        Self {
            status: GuardStatus::Accepted,
            kind: None,
            reason: None,
        }
    }

    pub fn rejected(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Self {
            status: GuardStatus::Rejected,
            kind: Some(kind),
            reason: Some(reason.into()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == GuardStatus::Accepted
    }
}
