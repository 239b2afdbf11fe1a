//! # Iron Kernel
//!
//! The unified API for the Iron governance kernel: signed actions,
//! delegated authority, and an audited source of truth.
//!
//! ## Overview
//!
//! Every change to a metric goes through the [`GovernanceKernel`] as an
//! attempt:
//!
//! - **Submit**: the kernel must be booted and the action must not be older
//!   than anything already seen
//! - **Guard**: identity, signature, jurisdiction, quota and strict
//!   protocols; rejections are recorded, never thrown
//! - **Commit**: the budget is charged and the value applied, or nothing is
//!
//! Every outcome lands in a hash-chained audit log, and every committed
//! value is linked to the entry that produced it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use iron_kernel::{GovernanceKernel, KernelConfig};
//! use iron_kernel::authority::{Delegation, IdentityRegistry, METRIC_WRITE};
//! use iron_kernel::core::{ActionBuilder, Keypair, LogicalTimestamp};
//! use iron_kernel::ledger::{AuditLog, MetricDefinition, MetricRegistry};
//!
//! fn example() -> iron_kernel::Result<()> {
//!     let admin = Keypair::generate();
//!     let bot = Keypair::generate();
//!
//!     let identities = Arc::new(IdentityRegistry::new());
//!     identities.register("admin", admin.public_key(), true, LogicalTimestamp::ZERO)?;
//!     identities.register("bot", bot.public_key(), false, LogicalTimestamp::ZERO)?;
//!
//!     let metrics = Arc::new(MetricRegistry::new());
//!     metrics.register(MetricDefinition::gauge("system.load"));
//!
//!     let mut kernel = GovernanceKernel::new(
//!         identities,
//!         metrics,
//!         Arc::new(AuditLog::new()),
//!         KernelConfig::default(),
//!     );
//!     kernel.boot();
//!     kernel.grant_authority(
//!         "admin",
//!         Delegation::new("g1", "admin", "bot", "system").limit(METRIC_WRITE, 50.0),
//!     )?;
//!
//!     let action = ActionBuilder::new("bot", "system.load", 12.0).at(1, 0).sign(&bot);
//!     kernel.execute(action, None)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `iron_kernel::core` - Primitives (Action, Keypair, LogicalTimestamp, etc.)
//! - `iron_kernel::authority` - Identities and delegations
//! - `iron_kernel::ledger` - Audit log and state model
//! - `iron_kernel::protocol` - Protocols and bundles
//! - `iron_kernel::store` - Audit persistence

pub mod accountability;
pub mod attempt;
pub mod config;
pub mod error;
pub mod interface;
pub mod kernel;
pub mod simulation;

// Re-export component crates
pub use iron_kernel_authority as authority;
pub use iron_kernel_core as core;
pub use iron_kernel_ledger as ledger;
pub use iron_kernel_protocol as protocol;
pub use iron_kernel_store as store;

// Re-export main types for convenience
pub use accountability::{AccountabilityEngine, Sla};
pub use attempt::{Attempt, AttemptId, AttemptPhase, GuardOutcome, GuardStatus, RejectionKind};
pub use config::{KernelConfig, SimulationConfig};
pub use error::{KernelError, Result};
pub use interface::{AuditRecord, BreachReport, GovernanceInterface};
pub use kernel::{GovernanceKernel, KernelPhase};
pub use simulation::{SimAction, SimulationEngine, SimulationOutcome, TrendAnalyzer};

// Re-export commonly used core types
pub use iron_kernel_core::{
    Action, ActionBuilder, ActionId, Blake3Hash, Budget, BudgetKind, EntityId, Keypair,
    LogicalTimestamp, MetricId, MetricValue,
};
