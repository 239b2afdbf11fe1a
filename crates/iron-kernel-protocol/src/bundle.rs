//! Signed, content-addressed protocol bundles.
//!
//! ```text
//! bundle_id = blake3(canonical_json({ owner, protocols }))
//! signature = sign(owner_key, hex(bundle_id))
//! ```
//!
//! Canonicalization sorts every object key recursively, so the id does not
//! depend on how the bundle was assembled.

use serde::{Deserialize, Serialize};

use iron_kernel_core::{
    canonical_hash, Blake3Hash, Ed25519PublicKey, Ed25519Signature, EntityId, Jurisdiction,
    Keypair,
};

use crate::error::{ProtocolError, Result};
use crate::types::Protocol;

/// Who publishes a bundle, and where they have authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleOwner {
    pub entity_id: EntityId,
    pub public_key: Ed25519PublicKey,
    pub scope: Jurisdiction,
}

/// The hashed portion of a bundle.
#[derive(Serialize)]
struct BundleContent<'a> {
    owner: &'a BundleOwner,
    protocols: &'a [Protocol],
}

/// A package of protocols distributed as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolBundle {
    pub bundle_id: Blake3Hash,
    pub owner: BundleOwner,
    pub signature: Ed25519Signature,
    pub protocols: Vec<Protocol>,
}

impl ProtocolBundle {
    /// Hash the owner and protocols.
    pub fn content_id(owner: &BundleOwner, protocols: &[Protocol]) -> Result<Blake3Hash> {
        Ok(canonical_hash(&BundleContent { owner, protocols })?)
    }

    /// Build and sign a bundle.
    pub fn seal(
        owner: impl Into<EntityId>,
        scope: impl Into<Jurisdiction>,
        protocols: Vec<Protocol>,
        keypair: &Keypair,
    ) -> Result<Self> {
        let owner = BundleOwner {
            entity_id: owner.into(),
            public_key: keypair.public_key(),
            scope: scope.into(),
        };
        let bundle_id = Self::content_id(&owner, &protocols)?;
        let signature = keypair.sign(bundle_id.to_hex().as_bytes());

        Ok(Self {
            bundle_id,
            owner,
            signature,
            protocols,
        })
    }

    /// Recompute the id from content.
    pub fn compute_id(&self) -> Result<Blake3Hash> {
        Self::content_id(&self.owner, &self.protocols)
    }

    /// Check the declared id and the owner's signature over it.
    pub fn verify_integrity(&self) -> Result<()> {
        let derived = self.compute_id()?;
        if derived != self.bundle_id {
            return Err(ProtocolError::BundleIntegrity(format!(
                "bundle id mismatch: declared {}, derived {}",
                self.bundle_id, derived
            )));
        }

        self.owner
            .public_key
            .verify(self.bundle_id.to_hex().as_bytes(), &self.signature)
            .map_err(|_| ProtocolError::BundleIntegrity("invalid owner signature".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProtocolEngine;
    use crate::types::{Category, Comparator, Lifecycle, Predicate, Rule};

    fn habit(name: &str, target: &str) -> Protocol {
        let mut protocol = Protocol::new("", name, Category::Habit)
            .when(Predicate::threshold("temp", Comparator::Gt, 70.0))
            .then(Rule::mutate(target, 1.0));
        protocol.lifecycle = Lifecycle::Active;
        protocol
    }

    fn signed(scope: &str, protocols: Vec<Protocol>) -> ProtocolBundle {
        let keypair = Keypair::from_seed(&[0x77; 32]);
        ProtocolBundle::seal("marketing-lead", scope, protocols, &keypair).unwrap()
    }

    #[test]
    fn test_seal_then_verify() {
        let bundle = signed("org.marketing", vec![habit("cool", "fan")]);
        bundle.verify_integrity().unwrap();
    }

    #[test]
    fn test_any_edit_breaks_id() {
        let mut bundle = signed("org.marketing", vec![habit("cool", "fan")]);
        bundle.protocols[0].execution = vec![Rule::mutate("fan", 100.0)];
        let err = bundle.verify_integrity().unwrap_err();
        assert!(err.to_string().contains("bundle id mismatch"));

        let mut bundle = signed("org.marketing", vec![habit("cool", "fan")]);
        bundle.owner.scope = Jurisdiction::wildcard();
        assert!(bundle.verify_integrity().is_err());
    }

    #[test]
    fn test_resigned_by_stranger_fails() {
        let mut bundle = signed("org.marketing", vec![habit("cool", "fan")]);
        let stranger = Keypair::from_seed(&[0x01; 32]);
        bundle.signature = stranger.sign(bundle.bundle_id.to_hex().as_bytes());
        let err = bundle.verify_integrity().unwrap_err();
        assert!(err.to_string().contains("invalid owner signature"));
    }

    #[test]
    fn test_json_roundtrip_keeps_id() {
        let bundle = signed("org", vec![habit("a", "fan"), habit("b", "alarm")]);
        let json = serde_json::to_string(&bundle).unwrap();
        let back: ProtocolBundle = serde_json::from_str(&json).unwrap();
        back.verify_integrity().unwrap();
    }

    #[test]
    fn test_scope_containment_on_load() {
        let bundle = signed("org.marketing", vec![habit("cool", "fan")]);

        let mut engine = ProtocolEngine::new();
        assert!(matches!(
            engine.load_bundle(&bundle, &Jurisdiction::from("org.sales")),
            Err(ProtocolError::BundleIntegrity(_))
        ));
        assert!(engine.is_empty());

        let ids = engine.load_bundle(&bundle, &Jurisdiction::from("org")).unwrap();
        assert_eq!(ids, vec![format!("{}.cool", bundle.bundle_id.to_hex())]);
        assert!(engine.get(&ids[0]).unwrap().is_active());
    }

    #[test]
    fn test_load_rejects_tampered_bundle() {
        let mut bundle = signed("org", vec![habit("cool", "fan")]);
        bundle.protocols[0].strict = true;
        let mut engine = ProtocolEngine::new();
        assert!(engine.load_bundle(&bundle, &Jurisdiction::wildcard()).is_err());
        assert!(engine.is_empty());
    }

    #[test]
    fn test_load_rejects_invalid_protocol() {
        let bundle = signed("org", vec![habit("", "fan")]);
        let mut engine = ProtocolEngine::new();
        assert!(matches!(
            engine.load_bundle(&bundle, &Jurisdiction::wildcard()),
            Err(ProtocolError::Invalid { .. })
        ));
    }

    #[test]
    fn test_load_rejects_metric_owned_elsewhere() {
        let mut engine = ProtocolEngine::new();
        engine
            .propose(Protocol::new("existing", "existing", Category::Habit).then(Rule::mutate("fan", 1.0)))
            .unwrap();

        let bundle = signed("org", vec![habit("alarmist", "alarm"), habit("cool", "fan")]);
        let err = engine.load_bundle(&bundle, &Jurisdiction::wildcard()).unwrap_err();
        assert!(matches!(err, ProtocolError::Conflict { .. }));
        // All or nothing: the non-conflicting protocol was not merged either.
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_revoked_owner_releases_metric() {
        let mut engine = ProtocolEngine::new();
        engine
            .propose(Protocol::new("old", "old", Category::Habit).then(Rule::mutate("fan", 1.0)))
            .unwrap();
        engine.revoke("old").unwrap();

        let bundle = signed("org", vec![habit("cool", "fan")]);
        engine.load_bundle(&bundle, &Jurisdiction::wildcard()).unwrap();
        assert_eq!(engine.len(), 2);
    }
}
