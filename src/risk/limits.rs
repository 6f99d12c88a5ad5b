//! Position limits and drawdown controls

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Per-strategy risk limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Largest absolute position in units
    #[serde(default)]
    pub max_position_size: Option<Decimal>,
    /// Drawdown from peak equity (fraction) that stops new exposure
    #[serde(default)]
    pub max_drawdown_pct: Option<Decimal>,
}

impl RiskLimits {
    pub fn with_max_position_size(mut self, units: Decimal) -> Self {
        self.max_position_size = Some(units);
        self
    }

    pub fn with_max_drawdown_pct(mut self, pct: Decimal) -> Self {
        self.max_drawdown_pct = Some(pct);
        self
    }

    /// Check that configured limits are usable
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_position_size {
            if max <= Decimal::ZERO {
                return Err(format!("max_position_size must be positive, got {max}"));
            }
        }
        if let Some(pct) = self.max_drawdown_pct {
            if pct <= Decimal::ZERO || pct > Decimal::ONE {
                return Err(format!("max_drawdown_pct must be in (0, 1], got {pct}"));
            }
        }
        Ok(())
    }
}

/// Tracks peak equity to measure drawdown
#[derive(Debug, Clone)]
pub struct DrawdownMonitor {
    /// Peak equity value
    pub peak_equity: Decimal,
    /// Current equity value
    pub current_equity: Decimal,
}

impl DrawdownMonitor {
    pub fn new(initial_equity: Decimal) -> Self {
        Self {
            peak_equity: initial_equity,
            current_equity: initial_equity,
        }
    }

    /// Update with new equity value
    pub fn update(&mut self, new_equity: Decimal) {
        self.current_equity = new_equity;
        if new_equity > self.peak_equity {
            self.peak_equity = new_equity;
        }
    }

    /// Current drawdown from peak as a fraction
    pub fn current_drawdown(&self) -> Decimal {
        if self.peak_equity <= dec!(0) {
            return dec!(0);
        }
        ((self.peak_equity - self.current_equity) / self.peak_equity).max(dec!(0))
    }

    /// Drawdown that breaches the configured stop, if any
    pub fn breach(&self, limits: &RiskLimits) -> Option<Decimal> {
        let limit = limits.max_drawdown_pct?;
        let drawdown = self.current_drawdown();
        (drawdown >= limit).then_some(drawdown)
    }
}
