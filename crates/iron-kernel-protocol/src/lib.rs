//! # Iron Kernel Protocol
//!
//! Declarative protocols over metric state.
//!
//! ## Overview
//!
//! A [`Protocol`] pairs preconditions ([`Predicate`]) with effects
//! ([`Rule`]) and moves through an explicit [`Lifecycle`]. Only ACTIVE
//! protocols take part in evaluation. Non-strict protocols are
//! automations: when all of their preconditions hold they mutate metrics.
//! Strict protocols are gates: they reject incoming actions that would
//! leave their preconditions false.
//!
//! Two triggered automations writing the same metric are a conflict, and
//! nothing executes. Protocols can be distributed as signed
//! [`ProtocolBundle`]s, verified by content hash, owner signature and
//! owner scope before they are merged.

pub mod bundle;
pub mod engine;
pub mod error;
pub mod types;

pub use bundle::{BundleOwner, ProtocolBundle};
pub use engine::{PlannedMutation, ProtocolEngine};
pub use error::{ProtocolError, Result};
pub use types::{Category, Comparator, Lifecycle, Predicate, Protocol, Rule};
