//! Channel breakout

use super::indicators::{highest_high, lowest_low};
use super::{
    stance_action, Action, HistoryWindow, Stance, StrategyConfig, StrategyError,
    StrategyEvaluator, StrategyKind,
};
use crate::portfolio::PortfolioState;
use rust_decimal::Decimal;

/// Enter when the close leaves the `lookback` channel of prior bars
///
/// An open long is exited when the close falls through the low of the
/// shorter `exit_lookback` channel (and symmetrically for shorts).
#[derive(Debug, Clone)]
pub struct Breakout {
    lookback: usize,
    exit_lookback: usize,
    allow_short: bool,
}

impl Breakout {
    pub fn from_config(config: &StrategyConfig) -> Result<Self, StrategyError> {
        let lookback = config.period("lookback", None)?;
        let exit_lookback = config.period("exit_lookback", Some((lookback / 2).max(1)))?;
        if exit_lookback > lookback {
            return Err(StrategyError::invalid(
                "exit_lookback",
                format!("exit channel ({exit_lookback}) longer than entry channel ({lookback})"),
            ));
        }
        Ok(Self {
            lookback,
            exit_lookback,
            allow_short: config.flag("allow_short")?,
        })
    }
}

impl StrategyEvaluator for Breakout {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Breakout
    }

    fn warmup(&self) -> usize {
        self.lookback + 1
    }

    fn decide(
        &self,
        window: &HistoryWindow<'_>,
        portfolio: &PortfolioState,
        config: &StrategyConfig,
    ) -> Result<Action, StrategyError> {
        let Some(channel) = window.previous(self.lookback) else {
            return Ok(Action::Hold);
        };
        let close = window.current().close;
        let (Some(upper), Some(lower)) = (highest_high(channel), lowest_low(channel)) else {
            return Ok(Action::Hold);
        };

        let held = portfolio.position_size;
        let stance = if close > upper {
            Stance::Long
        } else if close < lower {
            if self.allow_short {
                Stance::Short
            } else {
                Stance::Flat
            }
        } else {
            // inside the entry channel: check the exit channel
            let exit = window.previous(self.exit_lookback).unwrap_or(channel);
            match (lowest_low(exit), highest_high(exit)) {
                (Some(low), _) if held > Decimal::ZERO && close < low => Stance::Flat,
                (_, Some(high)) if held < Decimal::ZERO && close > high => Stance::Flat,
                _ => Stance::Keep,
            }
        };
        stance_action(stance, window, portfolio, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::PositionSizing;
    use crate::strategy::test_support::daily_bars;
    use rust_decimal_macros::dec;

    fn config() -> StrategyConfig {
        StrategyConfig::new("breakout")
            .with_param("lookback", 3i64)
            .with_param("exit_lookback", 2i64)
            .with_sizing(PositionSizing::FixedUnits { units: dec!(2) })
    }

    #[test]
    fn test_default_exit_lookback() {
        let config = StrategyConfig::new("breakout").with_param("lookback", 10i64);
        let strategy = Breakout::from_config(&config).unwrap();
        assert_eq!(strategy.exit_lookback, 5);
        assert_eq!(strategy.warmup(), 11);
    }

    #[test]
    fn test_missing_lookback() {
        assert!(Breakout::from_config(&StrategyConfig::new("breakout")).is_err());
    }

    #[test]
    fn test_breakout_above_channel() {
        let config = config();
        let strategy = Breakout::from_config(&config).unwrap();
        let bars = daily_bars(&[dec!(10), dec!(11), dec!(10), dec!(12)]);
        let window = HistoryWindow::up_to(&bars, 3).unwrap();
        let action = strategy
            .decide(&window, &PortfolioState::new(dec!(1000)), &config)
            .unwrap();
        assert_eq!(action, Action::EnterLong(dec!(2)));
    }

    #[test]
    fn test_inside_channel_holds_when_flat() {
        let config = config();
        let strategy = Breakout::from_config(&config).unwrap();
        let bars = daily_bars(&[dec!(10), dec!(12), dec!(9), dec!(11)]);
        let window = HistoryWindow::up_to(&bars, 3).unwrap();
        let action = strategy
            .decide(&window, &PortfolioState::new(dec!(1000)), &config)
            .unwrap();
        assert_eq!(action, Action::Hold);
    }

    #[test]
    fn test_exit_channel_closes_long() {
        let config = config();
        let strategy = Breakout::from_config(&config).unwrap();
        // entry channel low 9, exit channel (last 2) low 11, close 10
        let bars = daily_bars(&[dec!(9), dec!(12), dec!(11), dec!(10)]);
        let window = HistoryWindow::up_to(&bars, 3).unwrap();
        let mut state = PortfolioState::new(dec!(980));
        state.position_size = dec!(2);
        let action = strategy.decide(&window, &state, &config).unwrap();
        assert_eq!(action, Action::ExitPosition);
    }

    #[test]
    fn test_breakdown_without_shorts_exits() {
        let config = config();
        let strategy = Breakout::from_config(&config).unwrap();
        let bars = daily_bars(&[dec!(10), dec!(11), dec!(10), dec!(8)]);
        let window = HistoryWindow::up_to(&bars, 3).unwrap();

        let flat = PortfolioState::new(dec!(1000));
        assert_eq!(strategy.decide(&window, &flat, &config).unwrap(), Action::Hold);

        let short_config = config.with_param("allow_short", true);
        let shorting = Breakout::from_config(&short_config).unwrap();
        assert_eq!(
            shorting.decide(&window, &flat, &short_config).unwrap(),
            Action::EnterShort(dec!(2))
        );
    }
}
