//! # Iron Kernel Core
//!
//! Pure primitives for the Iron governance kernel: actions, logical time,
//! jurisdictions, budgets, and canonicalization.
//!
//! This crate contains no I/O and no shared state. It is pure computation
//! over signed data structures.
//!
//! ## Key Types
//!
//! - [`Action`] - A signed request to set one metric to a new value
//! - [`ActionId`] - Content-addressed identifier (Blake3 hash)
//! - [`LogicalTimestamp`] - `time:logical` pair ordering every mutation
//! - [`Jurisdiction`] - Dot-hierarchical scope for delegated power
//! - [`Budget`] - Capacity consumed atomically at commit
//!
//! ## Canonicalization
//!
//! Hashes and signatures are computed over canonical JSON. See the
//! [`canonical`] module.

pub mod action;
pub mod budget;
pub mod canonical;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod jurisdiction;
pub mod types;
pub mod validation;
pub mod value;

pub use action::{Action, ActionBuilder, ActionId, MetricPayload};
pub use budget::{Budget, BudgetKind};
pub use canonical::{canonical_hash, canonical_json, to_canonical_json};
pub use clock::LogicalClock;
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{BudgetError, CoreError, ValidationError};
pub use jurisdiction::Jurisdiction;
pub use types::{EntityId, LogicalTimestamp, MetricId};
pub use validation::{validate_action, validate_action_structure};
pub use value::MetricValue;
