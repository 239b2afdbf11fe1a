//! Service-level agreements scored against current metric values.

use serde::{Deserialize, Serialize};
use tracing::debug;

use iron_kernel_core::MetricId;
use iron_kernel_ledger::MetricView;

/// Keep `metric_id` within `[min, max]` to earn the incentive; leave the
/// band and pay the penalty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sla {
    pub id: String,
    pub metric_id: MetricId,
    pub min: f64,
    pub max: f64,
    pub incentive_amount: f64,
    pub penalty_amount: f64,
}

pub struct AccountabilityEngine<'a> {
    view: &'a dyn MetricView,
}

impl<'a> AccountabilityEngine<'a> {
    pub fn new(view: &'a dyn MetricView) -> Self {
        Self { view }
    }

    /// Incentive inside the band, negative penalty outside it, zero when the
    /// metric is unset or not a number.
    pub fn check_sla(&self, sla: &Sla) -> f64 {
        let Some(value) = self.view.numeric(sla.metric_id.as_str()) else {
            return 0.0;
        };
        let settlement = if (sla.min..=sla.max).contains(&value) {
            sla.incentive_amount
        } else {
            -sla.penalty_amount
        };
        debug!(sla = %sla.id, value, settlement, "sla checked");
        settlement
    }
}
