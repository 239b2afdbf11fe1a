//! Identity registry: who exists, with which key, and whether they are revoked.
//!
//! Principals are never deleted. Revocation flips their status and is
//! irreversible, so the audit trail can always resolve an initiator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use iron_kernel_core::{Ed25519PublicKey, EntityId, LogicalTimestamp};

use crate::error::{AuthorityError, Result};

/// Whether a principal may still act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalStatus {
    Active,
    Revoked,
}

/// A registered principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: EntityId,
    pub public_key: Ed25519PublicKey,
    pub status: PrincipalStatus,
    pub is_root: bool,
    pub created_at: LogicalTimestamp,
    pub revoked_at: Option<LogicalTimestamp>,
}

impl Principal {
    pub fn is_active(&self) -> bool {
        self.status == PrincipalStatus::Active
    }
}

/// Registry of principals.
///
/// Shared by reference between the authority engine and the state model;
/// interior locking keeps lookups cheap for readers.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    principals: RwLock<HashMap<EntityId, Principal>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<EntityId, Principal>> {
        self.principals.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<EntityId, Principal>> {
        self.principals.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new principal.
    pub fn register(
        &self,
        id: impl Into<EntityId>,
        public_key: Ed25519PublicKey,
        is_root: bool,
        created_at: LogicalTimestamp,
    ) -> Result<()> {
        let id = id.into();
        let mut principals = self.write();
        if principals.contains_key(&id) {
            return Err(AuthorityError::DuplicatePrincipal(id));
        }

        debug!(principal = %id, is_root, "registering principal");
        principals.insert(
            id.clone(),
            Principal {
                id,
                public_key,
                status: PrincipalStatus::Active,
                is_root,
                created_at,
                revoked_at: None,
            },
        );
        Ok(())
    }

    /// Snapshot of a principal.
    pub fn get(&self, id: &str) -> Option<Principal> {
        self.read().get(id).cloned()
    }

    pub fn public_key(&self, id: &str) -> Option<Ed25519PublicKey> {
        self.read().get(id).map(|p| p.public_key)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.read().get(id).is_some_and(Principal::is_active)
    }

    pub fn is_root(&self, id: &str) -> bool {
        self.read().get(id).is_some_and(|p| p.is_root && p.is_active())
    }

    /// Look up a principal that is allowed to act.
    pub fn require_active(&self, id: &str) -> Result<Principal> {
        let principal = self
            .get(id)
            .ok_or_else(|| AuthorityError::UnknownPrincipal(EntityId::from(id)))?;
        if !principal.is_active() {
            return Err(AuthorityError::PrincipalRevoked(principal.id));
        }
        Ok(principal)
    }

    /// Revoke a principal. Revoking twice keeps the first revocation instant.
    pub fn revoke(&self, id: &str, at: LogicalTimestamp) -> Result<()> {
        let mut principals = self.write();
        let principal = principals
            .get_mut(id)
            .ok_or_else(|| AuthorityError::UnknownPrincipal(EntityId::from(id)))?;

        if principal.status == PrincipalStatus::Revoked {
            return Ok(());
        }
        principal.status = PrincipalStatus::Revoked;
        principal.revoked_at = Some(at);
        info!(principal = %id, at = %at, "principal revoked");
        Ok(())
    }

    /// All principals, sorted by id.
    pub fn principals(&self) -> Vec<Principal> {
        let mut all: Vec<Principal> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
