//! Consumable capacity charged at commit time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BudgetError;

/// What a budget measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetKind {
    Energy,
    Risk,
    Attention,
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BudgetKind::Energy => "ENERGY",
            BudgetKind::Risk => "RISK",
            BudgetKind::Attention => "ATTENTION",
        };
        f.write_str(name)
    }
}

/// A numeric capacity with a hard limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub kind: BudgetKind,
    pub limit: f64,
    used: f64,
}

impl Budget {
    pub fn new(kind: BudgetKind, limit: f64) -> Self {
        Self {
            kind,
            limit,
            used: 0.0,
        }
    }

    pub fn used(&self) -> f64 {
        self.used
    }

    pub fn remaining(&self) -> f64 {
        (self.limit - self.used).max(0.0)
    }

    /// Consume `amount`, all or nothing.
    ///
    /// On error `used` is unchanged.
    pub fn consume(&mut self, amount: f64) -> Result<(), BudgetError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(BudgetError::InvalidAmount(amount));
        }
        if self.used + amount > self.limit {
            return Err(BudgetError::Exhausted {
                kind: self.kind.to_string(),
                requested: amount,
                remaining: self.remaining(),
            });
        }
        self.used += amount;
        Ok(())
    }
}
