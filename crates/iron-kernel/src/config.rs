//! Kernel configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KernelConfig {
    /// Attempt cost when the caller gives none.
    pub default_cost: f64,
    /// Budget limit used by the interface's `submit` when none is given.
    pub default_budget_limit: f64,
    /// Earlier entries included in an incident timeline.
    pub incident_window: usize,
    /// Revoke an initiator whose attempt breaches a grant quota.
    pub auto_revoke_on_overscope: bool,
    /// Consult strict protocols during guard.
    pub enforce_policy_gates: bool,
    /// Terminal attempt records kept for introspection; older ones are dropped.
    pub attempt_retention: usize,
    /// Speculative execution settings.
    pub simulation: SimulationConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            default_cost: 1.0,
            default_budget_limit: 100.0,
            incident_window: 5,
            auto_revoke_on_overscope: true,
            enforce_policy_gates: true,
            attempt_retention: 1024,
            simulation: SimulationConfig::default(),
        }
    }
}

/// Configuration for simulation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    /// Budget consumed per run.
    pub cost: f64,
    /// Steps ahead the trend is extrapolated.
    pub horizon: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cost: 1.0,
            horizon: 1.0,
        }
    }
}
