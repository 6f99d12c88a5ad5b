//! Position sizing rules
//!
//! Sizes are expressed in units of the traded symbol and rounded down to
//! [`SIZE_DP`] decimal places.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Decimal places kept on position sizes
pub const SIZE_DP: u32 = 6;

/// Round a size down to the supported precision
pub fn round_size(units: Decimal) -> Decimal {
    units.round_dp_with_strategy(SIZE_DP, RoundingStrategy::ToZero)
}

/// How many units an entry signal asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PositionSizing {
    /// Always the same number of units
    FixedUnits { units: Decimal },
    /// A fraction of current equity at the deciding bar's close
    PercentOfEquity {
        fraction: Decimal,
        /// Relative drift between target and held size that triggers a resize
        #[serde(default)]
        rebalance_tolerance: Option<Decimal>,
    },
}

impl Default for PositionSizing {
    fn default() -> Self {
        PositionSizing::PercentOfEquity {
            fraction: dec!(0.95),
            rebalance_tolerance: None,
        }
    }
}

impl PositionSizing {
    /// Target units for the given equity and price
    ///
    /// `None` when the computation leaves the `Decimal` range.
    pub fn target_units(&self, equity: Decimal, price: Decimal) -> Option<Decimal> {
        match self {
            PositionSizing::FixedUnits { units } => Some(round_size(*units)),
            PositionSizing::PercentOfEquity { fraction, .. } => {
                if price <= Decimal::ZERO || equity <= Decimal::ZERO {
                    return Some(Decimal::ZERO);
                }
                let units = equity.checked_mul(*fraction)?.checked_div(price)?;
                Some(round_size(units))
            }
        }
    }

    /// Whether a held size has drifted far enough from target to resize
    pub fn needs_rebalance(&self, held: Decimal, target: Decimal) -> bool {
        let PositionSizing::PercentOfEquity {
            rebalance_tolerance: Some(tolerance),
            ..
        } = self
        else {
            return false;
        };
        let held = held.abs();
        if held.is_zero() || target <= Decimal::ZERO {
            return false;
        }
        ((target - held).abs() / held) > *tolerance
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            PositionSizing::FixedUnits { units } if *units <= Decimal::ZERO => {
                Err(format!("fixed units must be positive, got {units}"))
            }
            PositionSizing::PercentOfEquity { fraction, .. }
                if *fraction <= Decimal::ZERO || *fraction > Decimal::ONE =>
            {
                Err(format!("equity fraction must be in (0, 1], got {fraction}"))
            }
            PositionSizing::PercentOfEquity {
                rebalance_tolerance: Some(tolerance),
                ..
            } if *tolerance <= Decimal::ZERO => Err(format!(
                "rebalance tolerance must be positive, got {tolerance}"
            )),
            _ => Ok(()),
        }
    }
}
