//! Moving-average cross

use super::indicators::sma;
use super::{
    stance_action, Action, HistoryWindow, Stance, StrategyConfig, StrategyError,
    StrategyEvaluator, StrategyKind,
};
use crate::portfolio::PortfolioState;

/// Long while the fast SMA is above the slow SMA
///
/// Below the slow SMA the position is exited, or reversed to short when
/// `allow_short` is set.
#[derive(Debug, Clone)]
pub struct MovingAverageCross {
    fast: usize,
    slow: usize,
    allow_short: bool,
}

impl MovingAverageCross {
    pub fn from_config(config: &StrategyConfig) -> Result<Self, StrategyError> {
        let fast = config.period("fast", None)?;
        let slow = config.period("slow", None)?;
        if slow <= fast {
            return Err(StrategyError::invalid(
                "slow",
                format!("slow window ({slow}) must exceed fast window ({fast})"),
            ));
        }
        Ok(Self {
            fast,
            slow,
            allow_short: config.flag("allow_short")?,
        })
    }
}

impl StrategyEvaluator for MovingAverageCross {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MovingAverageCross
    }

    fn warmup(&self) -> usize {
        self.slow
    }

    fn decide(
        &self,
        window: &HistoryWindow<'_>,
        portfolio: &PortfolioState,
        config: &StrategyConfig,
    ) -> Result<Action, StrategyError> {
        let bars = window.bars();
        let (Some(fast), Some(slow)) = (sma(bars, self.fast)?, sma(bars, self.slow)?) else {
            return Ok(Action::Hold);
        };

        let stance = if fast > slow {
            Stance::Long
        } else if fast < slow {
            if self.allow_short {
                Stance::Short
            } else {
                Stance::Flat
            }
        } else {
            Stance::Keep
        };
        stance_action(stance, window, portfolio, config)
    }
}
