//! # Iron Kernel Testkit
//!
//! Testing utilities for the Iron governance kernel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: canonical payload and signing strings every implementation must reproduce
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: a booted kernel with a root principal, gauges and a clock
//!
//! ## Golden Vectors
//!
//! ```rust
//! use iron_kernel_testkit::vectors::{all_vectors, generate_action_from_vector};
//!
//! for vector in all_vectors() {
//!     let action = generate_action_from_vector(&vector);
//!     println!("{}: {}", vector.name, action.action_id.to_hex());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use iron_kernel_testkit::generators::{action_from_params, ActionParams};
//!
//! proptest! {
//!     #[test]
//!     fn action_id_is_deterministic(params: ActionParams) {
//!         let a = action_from_params(&params);
//!         prop_assert_eq!(a.compute_id(), a.action_id);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use iron_kernel_testkit::fixtures::KernelFixture;
//!
//! let mut fixture = KernelFixture::new();
//! fixture.add_principal("bot");
//! fixture.grant("bot", "system", Some(50.0));
//! let action = fixture.action("bot", "system.load", 12.0);
//! fixture.kernel.execute(action, None).unwrap();
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{activate, keypair_for, KernelFixture, METRICS, ROOT};
pub use generators::{action_from_params, ActionParams};
pub use vectors::{all_vectors, generate_action_from_vector, verify_all_vectors, GoldenVector};
