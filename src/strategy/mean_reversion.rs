//! Z-score mean reversion

use super::indicators::{sma, stddev};
use super::{
    stance_action, Action, HistoryWindow, Stance, StrategyConfig, StrategyError,
    StrategyEvaluator, StrategyKind,
};
use crate::portfolio::PortfolioState;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Buys stretched-low closes and exits once price returns toward the mean
#[derive(Debug, Clone)]
pub struct MeanReversion {
    period: usize,
    entry_z: Decimal,
    exit_z: Decimal,
    allow_short: bool,
}

impl MeanReversion {
    pub fn from_config(config: &StrategyConfig) -> Result<Self, StrategyError> {
        let period = config.period("period", None)?;
        if period < 2 {
            return Err(StrategyError::invalid("period", "needs at least 2 bars"));
        }
        let entry_z = config.number("entry_z")?.unwrap_or(dec!(2));
        let exit_z = config.number("exit_z")?.unwrap_or(dec!(0.5));
        if exit_z < Decimal::ZERO {
            return Err(StrategyError::invalid("exit_z", "must not be negative"));
        }
        if entry_z <= exit_z {
            return Err(StrategyError::invalid(
                "entry_z",
                format!("entry threshold ({entry_z}) must exceed exit threshold ({exit_z})"),
            ));
        }
        Ok(Self {
            period,
            entry_z,
            exit_z,
            allow_short: config.flag("allow_short")?,
        })
    }

    fn zscore(&self, window: &HistoryWindow<'_>) -> Result<Option<Decimal>, StrategyError> {
        let bars = window.bars();
        let (Some(mean), Some(std)) = (sma(bars, self.period)?, stddev(bars, self.period)?) else {
            return Ok(None);
        };
        if std.is_zero() {
            return Ok(None);
        }
        window
            .current()
            .close
            .checked_sub(mean)
            .and_then(|diff| diff.checked_div(std))
            .map(Some)
            .ok_or_else(|| StrategyError::Fault("z-score overflowed the decimal range".into()))
    }
}

impl StrategyEvaluator for MeanReversion {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MeanReversion
    }

    fn warmup(&self) -> usize {
        self.period
    }

    fn decide(
        &self,
        window: &HistoryWindow<'_>,
        portfolio: &PortfolioState,
        config: &StrategyConfig,
    ) -> Result<Action, StrategyError> {
        if window.len() < self.period {
            return Ok(Action::Hold);
        }
        let stance = match self.zscore(window)? {
            None => Stance::Keep,
            Some(z) if z <= -self.entry_z => Stance::Long,
            Some(z) if z >= self.entry_z => {
                if self.allow_short {
                    Stance::Short
                } else {
                    Stance::Flat
                }
            }
            Some(z) if z.abs() <= self.exit_z && !portfolio.position_size.is_zero() => {
                Stance::Flat
            }
            Some(_) => Stance::Keep,
        };
        stance_action(stance, window, portfolio, config)
    }
}
