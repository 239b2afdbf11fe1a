//! The authority engine: answers "may X do Y here, this much, now?".
//!
//! Resolution is first-match: grants are scanned in insertion order and the
//! first live grant whose jurisdiction covers the target decides, including
//! its quota. Overlapping grants are logged, never re-ranked.

use std::sync::Arc;
use tracing::{debug, info, warn};

use iron_kernel_core::{EntityId, LogicalTimestamp};

use crate::delegation::{AuthorityDescriptor, Delegation};
use crate::error::{AuthorityError, Result};
use crate::identity::IdentityRegistry;

/// Outcome of a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    /// The grant that matched.
    pub grant_id: String,
    /// How many live grants covered the target, including the matching one.
    pub covering_grants: usize,
}

/// Records delegations and enforces jurisdiction, expiry and quota.
#[derive(Debug)]
pub struct AuthorityEngine {
    identities: Arc<IdentityRegistry>,
    delegations: Vec<Delegation>,
}

impl AuthorityEngine {
    pub fn new(identities: Arc<IdentityRegistry>) -> Self {
        Self {
            identities,
            delegations: Vec::new(),
        }
    }

    pub fn identities(&self) -> &Arc<IdentityRegistry> {
        &self.identities
    }

    /// Record a delegation.
    ///
    /// This is the privileged administrative path; the caller has already
    /// been authorized to grant.
    pub fn grant(&mut self, delegation: Delegation) -> Result<()> {
        if self.delegations.iter().any(|d| d.id == delegation.id) {
            return Err(AuthorityError::DuplicateGrant(delegation.id));
        }
        debug!(
            grant = %delegation.id,
            granter = %delegation.granter,
            grantee = %delegation.grantee,
            jurisdiction = %delegation.jurisdiction,
            "recording delegation"
        );
        self.delegations.push(delegation);
        Ok(())
    }

    /// Authorize `amount` of `descriptor` for `entity` at instant `at`.
    pub fn authorize(
        &self,
        entity: &str,
        descriptor: &AuthorityDescriptor,
        amount: f64,
        at: LogicalTimestamp,
    ) -> Result<Authorization> {
        self.identities.require_active(entity)?;

        let covering = self.overlapping_grants(entity, descriptor, at);
        let Some(first) = covering.first() else {
            return Err(AuthorityError::NoJurisdiction {
                entity: EntityId::from(entity),
                descriptor: descriptor.to_string(),
            });
        };

        if covering.len() > 1 {
            warn!(
                entity,
                descriptor = %descriptor,
                grants = ?covering.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
                "overlapping grants; first match decides"
            );
        }

        if first.would_exceed(&descriptor.kind, amount) {
            return Err(quota_exceeded(first, &descriptor.kind, amount));
        }

        Ok(Authorization {
            grant_id: first.id.clone(),
            covering_grants: covering.len(),
        })
    }

    /// Boolean form of [`authorize`](Self::authorize) with no quota draw.
    pub fn authorized(
        &self,
        entity: &str,
        descriptor: &AuthorityDescriptor,
        at: LogicalTimestamp,
    ) -> bool {
        self.authorize(entity, descriptor, 0.0, at).is_ok()
    }

    /// Every live grant held by `entity` that covers the descriptor, in
    /// resolution order.
    pub fn overlapping_grants(
        &self,
        entity: &str,
        descriptor: &AuthorityDescriptor,
        at: LogicalTimestamp,
    ) -> Vec<&Delegation> {
        self.delegations
            .iter()
            .filter(|d| d.grantee.as_str() == entity && d.is_live_at(at) && d.covers(descriptor))
            .collect()
    }

    /// Charge `amount` of `kind` against a grant.
    ///
    /// The cap is checked against usage as it stands now; a charge that
    /// would breach it fails with [`AuthorityError::QuotaExceeded`] and
    /// charges nothing.
    pub fn record_usage(&mut self, grant_id: &str, kind: &str, amount: f64) -> Result<()> {
        let grant = self.grant_mut(grant_id)?;
        if grant.would_exceed(kind, amount) {
            return Err(quota_exceeded(grant, kind, amount));
        }
        grant.record_use(kind, amount);
        debug!(grant = grant_id, kind, amount, used = grant.used(kind), "usage recorded");
        Ok(())
    }

    /// Give back a charge for work that was never carried out.
    pub fn release_usage(&mut self, grant_id: &str, kind: &str, amount: f64) -> Result<()> {
        let grant = self.grant_mut(grant_id)?;
        grant.release_use(kind, amount);
        debug!(grant = grant_id, kind, amount, used = grant.used(kind), "usage released");
        Ok(())
    }

    fn grant_mut(&mut self, grant_id: &str) -> Result<&mut Delegation> {
        self.delegations
            .iter_mut()
            .find(|d| d.id == grant_id)
            .ok_or_else(|| AuthorityError::GrantNotFound(grant_id.to_owned()))
    }

    /// Revoke a principal. Committed state is untouched; future attempts fail.
    pub fn revoke(&self, entity: &str, at: LogicalTimestamp) -> Result<()> {
        info!(entity, at = %at, "revoking entity");
        self.identities.revoke(entity, at)
    }

    pub fn delegation(&self, grant_id: &str) -> Option<&Delegation> {
        self.delegations.iter().find(|d| d.id == grant_id)
    }

    /// All grants held by `entity`, live or not.
    pub fn grants_for(&self, entity: &str) -> Vec<&Delegation> {
        self.delegations
            .iter()
            .filter(|d| d.grantee.as_str() == entity)
            .collect()
    }

    pub fn delegations(&self) -> &[Delegation] {
        &self.delegations
    }
}

fn quota_exceeded(grant: &Delegation, kind: &str, amount: f64) -> AuthorityError {
    AuthorityError::QuotaExceeded {
        entity: grant.grantee.clone(),
        grant_id: grant.id.clone(),
        kind: kind.to_owned(),
        limit: grant.limits.get(kind).copied().unwrap_or(0.0),
        used: grant.used(kind),
        requested: amount,
    }
}
