//! Delegations: scoped, time-bounded, quota-bounded grants of power.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use iron_kernel_core::{EntityId, Jurisdiction, LogicalTimestamp, MetricId};

use crate::error::AuthorityError;

/// Action kind for writing a metric.
pub const METRIC_WRITE: &str = "METRIC.WRITE";

/// Action kind for administering identities and grants.
pub const IDENTITY_ADMIN: &str = "IDENTITY.ADMIN";

/// An action kind paired with the scope it targets, e.g. `METRIC.WRITE:system.load`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthorityDescriptor {
    pub kind: String,
    pub scope: String,
}

impl AuthorityDescriptor {
    pub fn new(kind: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            scope: scope.into(),
        }
    }

    /// Descriptor for writing a metric.
    pub fn metric_write(metric: &MetricId) -> Self {
        Self::new(METRIC_WRITE, metric.as_str())
    }

    /// Descriptor for administering identities under a scope.
    pub fn identity_admin(scope: impl Into<String>) -> Self {
        Self::new(IDENTITY_ADMIN, scope)
    }
}

impl fmt::Display for AuthorityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.scope)
    }
}

impl FromStr for AuthorityDescriptor {
    type Err = AuthorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, scope)) if !kind.is_empty() && !scope.is_empty() => {
                Ok(Self::new(kind, scope))
            }
            _ => Err(AuthorityError::InvalidDescriptor(s.to_owned())),
        }
    }
}

/// A grant of power from one principal to another.
///
/// Expired grants stay recorded for audit but no longer match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    pub id: String,
    pub granter: EntityId,
    pub grantee: EntityId,
    /// Free-form label for the role this grant confers.
    pub capacity: String,
    pub jurisdiction: Jurisdiction,
    pub granted_at: LogicalTimestamp,
    pub expires_at: Option<LogicalTimestamp>,
    /// Cap per action kind. Kinds without an entry are unlimited.
    #[serde(default)]
    pub limits: BTreeMap<String, f64>,
    /// Consumed amount per action kind.
    #[serde(default)]
    pub usage: BTreeMap<String, f64>,
    pub signature: String,
}

impl Delegation {
    /// Start a grant of `jurisdiction` from `granter` to `grantee`.
    pub fn new(
        id: impl Into<String>,
        granter: impl Into<EntityId>,
        grantee: impl Into<EntityId>,
        jurisdiction: impl Into<Jurisdiction>,
    ) -> Self {
        Self {
            id: id.into(),
            granter: granter.into(),
            grantee: grantee.into(),
            capacity: String::new(),
            jurisdiction: jurisdiction.into(),
            granted_at: LogicalTimestamp::ZERO,
            expires_at: None,
            limits: BTreeMap::new(),
            usage: BTreeMap::new(),
            signature: String::new(),
        }
    }

    pub fn capacity(mut self, capacity: impl Into<String>) -> Self {
        self.capacity = capacity.into();
        self
    }

    pub fn granted_at(mut self, ts: LogicalTimestamp) -> Self {
        self.granted_at = ts;
        self
    }

    pub fn expires_at(mut self, ts: LogicalTimestamp) -> Self {
        self.expires_at = Some(ts);
        self
    }

    /// Cap cumulative use of `kind`.
    pub fn limit(mut self, kind: impl Into<String>, cap: f64) -> Self {
        self.limits.insert(kind.into(), cap);
        self
    }

    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// A grant is live through its expiry instant.
    pub fn is_live_at(&self, at: LogicalTimestamp) -> bool {
        self.expires_at.map_or(true, |exp| at <= exp)
    }

    /// Whether this grant's jurisdiction covers a descriptor's scope.
    pub fn covers(&self, descriptor: &AuthorityDescriptor) -> bool {
        self.jurisdiction.contains(&descriptor.scope)
    }

    pub fn used(&self, kind: &str) -> f64 {
        self.usage.get(kind).copied().unwrap_or(0.0)
    }

    /// Remaining quota for `kind`, or `None` if unlimited.
    pub fn remaining(&self, kind: &str) -> Option<f64> {
        self.limits.get(kind).map(|cap| cap - self.used(kind))
    }

    /// Whether spending `amount` of `kind` would exceed the cap.
    pub fn would_exceed(&self, kind: &str, amount: f64) -> bool {
        self.limits
            .get(kind)
            .is_some_and(|cap| self.used(kind) + amount > *cap)
    }

    pub(crate) fn record_use(&mut self, kind: &str, amount: f64) {
        *self.usage.entry(kind.to_owned()).or_insert(0.0) += amount;
    }

    pub(crate) fn release_use(&mut self, kind: &str, amount: f64) {
        if let Some(used) = self.usage.get_mut(kind) {
            *used = (*used - amount).max(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_parse() {
        let d: AuthorityDescriptor = "METRIC.WRITE:system.load".parse().unwrap();
        assert_eq!(d.kind, METRIC_WRITE);
        assert_eq!(d.scope, "system.load");
        assert_eq!(d.to_string(), "METRIC.WRITE:system.load");

        assert!("METRIC.WRITE".parse::<AuthorityDescriptor>().is_err());
        assert!(":scope".parse::<AuthorityDescriptor>().is_err());
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let grant = Delegation::new("g1", "root", "bob", "system")
            .expires_at(LogicalTimestamp::new(100, 0));
        assert!(grant.is_live_at(LogicalTimestamp::new(100, 0)));
        assert!(!grant.is_live_at(LogicalTimestamp::new(100, 1)));
        assert!(!grant.is_live_at(LogicalTimestamp::new(101, 0)));
    }

    #[test]
    fn test_quota_arithmetic() {
        let mut grant = Delegation::new("g1", "root", "bob", "*").limit(METRIC_WRITE, 100.0);
        assert!(!grant.would_exceed(METRIC_WRITE, 90.0));
        grant.record_use(METRIC_WRITE, 90.0);
        assert_eq!(grant.remaining(METRIC_WRITE), Some(10.0));
        assert!(grant.would_exceed(METRIC_WRITE, 11.0));
        assert!(!grant.would_exceed(METRIC_WRITE, 10.0));
        assert!(!grant.would_exceed("OTHER", 1e9));
    }

    #[test]
    fn test_serde_shape() {
        let grant = Delegation::new("g1", "root", "bob", "system")
            .capacity("operator")
            .limit(METRIC_WRITE, 50.0);
        let json = serde_json::to_value(&grant).unwrap();
        assert_eq!(json["grantee"], "bob");
        assert_eq!(json["jurisdiction"], "system");
        assert_eq!(json["limits"]["METRIC.WRITE"], 50.0);
    }
}
