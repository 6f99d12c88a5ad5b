//! Decimal indicator helpers over bar windows
//!
//! `Ok(None)` means the window is too short; arithmetic that leaves the
//! `Decimal` range is a [`StrategyError::Fault`].

use super::StrategyError;
use crate::market_data::PriceBar;
use rust_decimal::{Decimal, MathematicalOps};

fn overflow(indicator: &str) -> StrategyError {
    StrategyError::Fault(format!("{indicator} overflowed the decimal range"))
}

/// Simple moving average of the last `period` closes
pub fn sma(bars: &[PriceBar], period: usize) -> Result<Option<Decimal>, StrategyError> {
    if period == 0 || bars.len() < period {
        return Ok(None);
    }
    let sum = bars[bars.len() - period..]
        .iter()
        .try_fold(Decimal::ZERO, |acc, b| acc.checked_add(b.close))
        .ok_or_else(|| overflow("sma"))?;
    Ok(Some(sum / Decimal::from(period)))
}

/// Population standard deviation of the last `period` closes
pub fn stddev(bars: &[PriceBar], period: usize) -> Result<Option<Decimal>, StrategyError> {
    let Some(mean) = sma(bars, period)? else {
        return Ok(None);
    };
    let squares = bars[bars.len() - period..]
        .iter()
        .try_fold(Decimal::ZERO, |acc, b| {
            let diff = b.close.checked_sub(mean)?;
            acc.checked_add(diff.checked_mul(diff)?)
        })
        .ok_or_else(|| overflow("stddev"))?;
    Ok((squares / Decimal::from(period)).sqrt())
}

/// Highest high across a slice
pub fn highest_high(bars: &[PriceBar]) -> Option<Decimal> {
    bars.iter().map(|b| b.high).max()
}

/// Lowest low across a slice
pub fn lowest_low(bars: &[PriceBar]) -> Option<Decimal> {
    bars.iter().map(|b| b.low).min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn bars(closes: &[Decimal]) -> Vec<PriceBar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| PriceBar::flat(start + Duration::days(i as i64), *c, dec!(1)))
            .collect()
    }

    #[test]
    fn test_sma() {
        let window = bars(&[dec!(1), dec!(2), dec!(3), dec!(4)]);
        assert_eq!(sma(&window, 2).unwrap(), Some(dec!(3.5)));
        assert_eq!(sma(&window, 4).unwrap(), Some(dec!(2.5)));
        assert_eq!(sma(&window, 5).unwrap(), None);
        assert_eq!(sma(&window, 0).unwrap(), None);
    }

    #[test]
    fn test_stddev() {
        let window = bars(&[
            dec!(2),
            dec!(4),
            dec!(4),
            dec!(4),
            dec!(5),
            dec!(5),
            dec!(7),
            dec!(9),
        ]);
        assert_eq!(stddev(&window, 8).unwrap(), Some(dec!(2)));
    }

    #[test]
    fn test_stddev_flat_is_zero() {
        let window = bars(&[dec!(3), dec!(3), dec!(3)]);
        assert_eq!(stddev(&window, 3).unwrap(), Some(dec!(0)));
    }

    #[test]
    fn test_stddev_overflow_is_fault() {
        let huge = dec!(100000000000000000000);
        let window = bars(&[huge, huge * dec!(3), huge, huge * dec!(3)]);
        assert!(sma(&window, 4).unwrap().is_some());
        let err = stddev(&window, 4).unwrap_err();
        assert!(matches!(err, StrategyError::Fault(_)));
    }

    #[test]
    fn test_channel_extremes() {
        let mut window = bars(&[dec!(10), dec!(12), dec!(11)]);
        window[1].high = dec!(13);
        window[2].low = dec!(9);
        assert_eq!(highest_high(&window), Some(dec!(13)));
        assert_eq!(lowest_low(&window), Some(dec!(9)));
        assert_eq!(highest_high(&[]), None);
    }
}
