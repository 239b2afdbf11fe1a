//! Error types for identity and delegation.

use thiserror::Error;

use iron_kernel_core::EntityId;

/// Errors that can occur during identity and authority operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthorityError {
    /// No principal is registered under this id.
    #[error("unknown principal: {0}")]
    UnknownPrincipal(EntityId),

    /// The principal exists but has been revoked.
    #[error("Entity revoked: {0}")]
    PrincipalRevoked(EntityId),

    /// A principal with this id already exists.
    #[error("principal already registered: {0}")]
    DuplicatePrincipal(EntityId),

    /// No live grant covers the requested scope.
    #[error("{entity} lacks Jurisdiction for {descriptor}")]
    NoJurisdiction { entity: EntityId, descriptor: String },

    /// A covering grant exists but the request would breach its quota.
    #[error("{entity} exceeds limits on grant {grant_id}: {kind} used {used} + {requested} > {limit}")]
    QuotaExceeded {
        entity: EntityId,
        grant_id: String,
        kind: String,
        limit: f64,
        used: f64,
        requested: f64,
    },

    /// Grant not found.
    #[error("grant not found: {0}")]
    GrantNotFound(String),

    /// A grant with this id already exists.
    #[error("grant already recorded: {0}")]
    DuplicateGrant(String),

    /// Descriptor text did not parse.
    #[error("invalid authority descriptor: {0}")]
    InvalidDescriptor(String),
}

impl AuthorityError {
    /// Whether this error is a quota breach (the case that escalates to revocation).
    pub fn is_quota_breach(&self) -> bool {
        matches!(self, AuthorityError::QuotaExceeded { .. })
    }
}

/// Result type for authority operations.
pub type Result<T> = std::result::Result<T, AuthorityError>;
