//! Actions: signed requests to set a metric to a new value.
//!
//! An action is identified by the hash of its content:
//!
//! ```text
//! action_id   = blake3(initiator ":" canonical(payload) ":" timestamp ":" expires_at)
//! signed_data = hex(action_id) ":" initiator ":" canonical(payload) ":" timestamp ":" expires_at
//! ```
//!
//! Both strings must be reproduced bit-for-bit by any verifier.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::canonical::canonical_json;
use crate::crypto::{hex_bytes, Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::types::{EntityId, LogicalTimestamp, MetricId};
use crate::value::MetricValue;

/// A 32-byte action identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl ActionId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        crate::crypto::decode_fixed(s).map(Self)
    }

    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl From<Blake3Hash> for ActionId {
    fn from(hash: Blake3Hash) -> Self {
        Self(hash.0)
    }
}

/// The mutation an action requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPayload {
    pub metric_id: MetricId,
    pub value: MetricValue,
}

impl MetricPayload {
    pub fn new(metric_id: impl Into<MetricId>, value: impl Into<MetricValue>) -> Self {
        Self {
            metric_id: metric_id.into(),
            value: value.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "metricId": self.metric_id.as_str(),
            "value": self.value.to_json(),
        })
    }

    /// Canonical JSON text of the payload.
    pub fn canonical(&self) -> String {
        canonical_json(&self.to_json())
    }
}

/// A signed, content-addressed request from a principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_id: ActionId,
    pub initiator: EntityId,
    pub payload: MetricPayload,
    pub timestamp: LogicalTimestamp,
    /// `0:0` means the action never expires.
    #[serde(default)]
    pub expires_at: LogicalTimestamp,
    pub signature: Ed25519Signature,
}

impl Action {
    /// Derive the content id from the action's fields.
    pub fn derive_id(
        initiator: &EntityId,
        payload: &MetricPayload,
        timestamp: LogicalTimestamp,
        expires_at: LogicalTimestamp,
    ) -> ActionId {
        let preimage = format!(
            "{}:{}:{}:{}",
            initiator,
            payload.canonical(),
            timestamp,
            expires_at
        );
        ActionId::from(Blake3Hash::hash(preimage.as_bytes()))
    }

    /// The string the initiator signs, built from explicit parts.
    pub fn signing_string_from_parts(
        action_id: &ActionId,
        initiator: &EntityId,
        payload: &MetricPayload,
        timestamp: LogicalTimestamp,
        expires_at: LogicalTimestamp,
    ) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            action_id.to_hex(),
            initiator,
            payload.canonical(),
            timestamp,
            expires_at
        )
    }

    /// The string the initiator signed, re-derived from this action.
    pub fn signing_string(&self) -> String {
        Self::signing_string_from_parts(
            &self.action_id,
            &self.initiator,
            &self.payload,
            self.timestamp,
            self.expires_at,
        )
    }

    /// Recompute the id from content.
    pub fn compute_id(&self) -> ActionId {
        Self::derive_id(
            &self.initiator,
            &self.payload,
            self.timestamp,
            self.expires_at,
        )
    }

    /// Verify the signature against a public key.
    pub fn verify_signature(&self, key: &Ed25519PublicKey) -> Result<(), CoreError> {
        key.verify(self.signing_string().as_bytes(), &self.signature)
    }

    pub fn metric_id(&self) -> &MetricId {
        &self.payload.metric_id
    }

    pub fn value(&self) -> &MetricValue {
        &self.payload.value
    }

    /// Whether the action has passed its expiry at `now`.
    pub fn is_expired_at(&self, now: LogicalTimestamp) -> bool {
        !self.expires_at.is_zero() && now > self.expires_at
    }

    /// JSON view used for hashing audit entries.
    pub fn to_json(&self) -> Value {
        json!({
            "actionId": self.action_id.to_hex(),
            "initiator": self.initiator.as_str(),
            "payload": self.payload.to_json(),
            "timestamp": self.timestamp.to_string(),
            "expiresAt": self.expires_at.to_string(),
            "signature": self.signature.to_hex(),
        })
    }
}

/// Builder for creating signed actions.
pub struct ActionBuilder {
    initiator: EntityId,
    payload: MetricPayload,
    timestamp: LogicalTimestamp,
    expires_at: LogicalTimestamp,
}

impl ActionBuilder {
    /// Start building an action that sets `metric` to `value`.
    pub fn new(
        initiator: impl Into<EntityId>,
        metric: impl Into<MetricId>,
        value: impl Into<MetricValue>,
    ) -> Self {
        Self {
            initiator: initiator.into(),
            payload: MetricPayload::new(metric, value),
            timestamp: LogicalTimestamp::ZERO,
            expires_at: LogicalTimestamp::ZERO,
        }
    }

    pub fn timestamp(mut self, ts: LogicalTimestamp) -> Self {
        self.timestamp = ts;
        self
    }

    /// Shorthand for `timestamp(LogicalTimestamp::new(time, logical))`.
    pub fn at(self, time: u64, logical: u64) -> Self {
        self.timestamp(LogicalTimestamp::new(time, logical))
    }

    pub fn expires_at(mut self, ts: LogicalTimestamp) -> Self {
        self.expires_at = ts;
        self
    }

    /// Derive the id and sign.
    pub fn sign(self, keypair: &Keypair) -> Action {
        let action_id =
            Action::derive_id(&self.initiator, &self.payload, self.timestamp, self.expires_at);
        let signed = Action::signing_string_from_parts(
            &action_id,
            &self.initiator,
            &self.payload,
            self.timestamp,
            self.expires_at,
        );
        let signature = keypair.sign(signed.as_bytes());

        Action {
            action_id,
            initiator: self.initiator,
            payload: self.payload,
            timestamp: self.timestamp,
            expires_at: self.expires_at,
            signature,
        }
    }

    /// Build with a caller-supplied signature, valid or not.
    pub fn with_signature(self, signature: Ed25519Signature) -> Action {
        let action_id =
            Action::derive_id(&self.initiator, &self.payload, self.timestamp, self.expires_at);
        Action {
            action_id,
            initiator: self.initiator,
            payload: self.payload,
            timestamp: self.timestamp,
            expires_at: self.expires_at,
            signature,
        }
    }
}
