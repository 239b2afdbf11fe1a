//! # Iron Kernel Authority
//!
//! Principals and the delegation of scoped power between them.
//!
//! ## Overview
//!
//! - [`IdentityRegistry`] holds principals (id, public key, status, root flag).
//!   Revocation is a status flip; principals are never removed.
//! - [`AuthorityEngine`] records [`Delegation`]s and answers whether an
//!   entity may perform an action kind on a target scope, enforcing
//!   hierarchical jurisdiction, expiry, and per-kind quotas.
//!
//! Quota breaches are reported as a distinct error
//! ([`AuthorityError::QuotaExceeded`]) so callers can escalate them
//! separately from plain absence of authority.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use iron_kernel_authority::{
//!     AuthorityDescriptor, AuthorityEngine, Delegation, IdentityRegistry, METRIC_WRITE,
//! };
//! use iron_kernel_core::{Keypair, LogicalTimestamp};
//!
//! let identities = Arc::new(IdentityRegistry::new());
//! identities
//!     .register("ops", Keypair::generate().public_key(), false, LogicalTimestamp::ZERO)
//!     .unwrap();
//!
//! let mut authority = AuthorityEngine::new(identities);
//! authority
//!     .grant(Delegation::new("g1", "root", "ops", "system").limit(METRIC_WRITE, 100.0))
//!     .unwrap();
//!
//! let target: AuthorityDescriptor = "METRIC.WRITE:system.load".parse().unwrap();
//! assert!(authority.authorized("ops", &target, LogicalTimestamp::new(1, 0)));
//! ```

pub mod delegation;
pub mod engine;
pub mod error;
pub mod identity;

pub use delegation::{AuthorityDescriptor, Delegation, IDENTITY_ADMIN, METRIC_WRITE};
pub use engine::{Authorization, AuthorityEngine};
pub use error::{AuthorityError, Result};
pub use identity::{IdentityRegistry, Principal, PrincipalStatus};
