//! # Iron Kernel Ledger
//!
//! Evidence and truth: the hash-chained [`AuditLog`] and the [`StateModel`]
//! holding current metric values.
//!
//! The state model depends only on the [`EvidenceSink`] capability, which
//! the audit log implements. Every attempted mutation that reaches
//! [`StateModel::apply`] leaves an entry, whether it succeeds or fails.

pub mod audit;
pub mod error;
pub mod metric;
pub mod state;

pub use audit::{AuditLog, Incident, LogEntry, LogStatus, GENESIS_HASH};
pub use error::{LedgerError, Result};
pub use metric::{MetricDefinition, MetricKind, MetricRegistry, Validator, ValidatorFn};
pub use state::{EvidenceSink, MetricView, StateModel, StateValue};
