//! Commission and slippage model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Deterministic fill-cost policy
///
/// Slippage moves the fill price against the trader (buys up, sells down);
/// commission is a rate on fill notional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    pub commission_rate: Decimal,
    pub slippage_rate: Decimal,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::zero()
    }
}

impl CostModel {
    pub fn new(commission_rate: Decimal, slippage_rate: Decimal) -> Self {
        Self {
            commission_rate,
            slippage_rate,
        }
    }

    /// No commission, no slippage
    pub fn zero() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    /// Fill price for a buy or sell at `price`, `None` on overflow
    pub fn fill_price(&self, price: Decimal, buying: bool) -> Option<Decimal> {
        let factor = if buying {
            Decimal::ONE + self.slippage_rate
        } else {
            Decimal::ONE - self.slippage_rate
        };
        price.checked_mul(factor)
    }

    /// Commission on `units` filled at `fill_price`, `None` on overflow
    pub fn commission(&self, units: Decimal, fill_price: Decimal) -> Option<Decimal> {
        units
            .abs()
            .checked_mul(fill_price)?
            .checked_mul(self.commission_rate)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.commission_rate < Decimal::ZERO || self.commission_rate >= Decimal::ONE {
            return Err(format!(
                "commission rate must be in [0, 1), got {}",
                self.commission_rate
            ));
        }
        if self.slippage_rate < Decimal::ZERO || self.slippage_rate >= Decimal::ONE {
            return Err(format!(
                "slippage rate must be in [0, 1), got {}",
                self.slippage_rate
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_slippage_direction() {
        let costs = CostModel::new(dec!(0), dec!(0.01));
        assert_eq!(costs.fill_price(dec!(100), true), Some(dec!(101)));
        assert_eq!(costs.fill_price(dec!(100), false), Some(dec!(99)));
    }

    #[test]
    fn test_commission_on_notional() {
        let costs = CostModel::new(dec!(0.001), dec!(0));
        assert_eq!(costs.commission(dec!(-10), dec!(50)), Some(dec!(0.5)));
    }

    #[test]
    fn test_overflow_is_none() {
        let costs = CostModel::new(dec!(0.001), dec!(0.01));
        assert_eq!(costs.fill_price(Decimal::MAX, true), None);
        assert_eq!(costs.commission(Decimal::MAX, dec!(10)), None);
    }

    #[test]
    fn test_validate() {
        assert!(CostModel::zero().validate().is_ok());
        assert!(CostModel::new(dec!(-0.1), dec!(0)).validate().is_err());
        assert!(CostModel::new(dec!(0), dec!(1)).validate().is_err());
    }
}
