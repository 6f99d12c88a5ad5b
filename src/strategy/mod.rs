//! Strategy evaluation module
//!
//! A strategy is a tagged [`StrategyConfig`] (kind + parameter mapping)
//! resolved once into a [`StrategyEvaluator`]. Evaluators only ever see a
//! [`HistoryWindow`] ending at the current bar.

mod breakout;
mod indicators;
mod ma_cross;
mod mean_reversion;
mod types;

pub use breakout::Breakout;
pub use indicators::{highest_high, lowest_low, sma, stddev};
pub use ma_cross::MovingAverageCross;
pub use mean_reversion::MeanReversion;
pub use types::{Action, ParamValue, StrategyConfig, StrategyKind};

use crate::error::ErrorKind;
use crate::market_data::PriceBar;
use crate::portfolio::PortfolioState;
use rust_decimal::Decimal;
use thiserror::Error;

/// Strategy errors
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Unsupported strategy: {0}")]
    UnsupportedStrategy(String),
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    /// Evaluation failed on a bar
    #[error("Strategy fault: {0}")]
    Fault(String),
}

impl StrategyError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        StrategyError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StrategyError::UnsupportedStrategy(_) | StrategyError::InvalidParameter { .. } => {
                ErrorKind::UnsupportedStrategy
            }
            StrategyError::Fault(_) => ErrorKind::SimulationFault,
        }
    }
}

/// Bars observed so far, ending at the bar being decided
#[derive(Debug, Clone, Copy)]
pub struct HistoryWindow<'a> {
    bars: &'a [PriceBar],
}

impl<'a> HistoryWindow<'a> {
    /// Window over `bars[..=index]`, or `None` if `index` is out of range
    pub fn up_to(bars: &'a [PriceBar], index: usize) -> Option<Self> {
        bars.get(..=index).map(|bars| Self { bars })
    }

    pub fn bars(&self) -> &'a [PriceBar] {
        self.bars
    }

    /// The bar being decided
    pub fn current(&self) -> &'a PriceBar {
        // never empty: built from a non-empty `..=index` slice
        &self.bars[self.bars.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// The `n` bars immediately before the current one
    pub fn previous(&self, n: usize) -> Option<&'a [PriceBar]> {
        let end = self.bars.len() - 1;
        if n == 0 || end < n {
            return None;
        }
        Some(&self.bars[end - n..end])
    }
}

/// Per-kind decision logic
///
/// Implementations are stateless across bars: everything they need is in the
/// window and the portfolio state, so the same inputs always give the same
/// action.
pub trait StrategyEvaluator: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Bars needed before the first non-Hold decision
    fn warmup(&self) -> usize;

    fn decide(
        &self,
        window: &HistoryWindow<'_>,
        portfolio: &PortfolioState,
        config: &StrategyConfig,
    ) -> Result<Action, StrategyError>;
}

/// Validate a config and build its evaluator
pub fn build_evaluator(
    config: &StrategyConfig,
) -> Result<Box<dyn StrategyEvaluator>, StrategyError> {
    let kind = config.strategy_kind()?;
    config
        .sizing
        .validate()
        .map_err(|reason| StrategyError::invalid("sizing", reason))?;
    config
        .risk
        .validate()
        .map_err(|reason| StrategyError::invalid("risk", reason))?;

    let evaluator: Box<dyn StrategyEvaluator> = match kind {
        StrategyKind::MovingAverageCross => Box::new(MovingAverageCross::from_config(config)?),
        StrategyKind::Breakout => Box::new(Breakout::from_config(config)?),
        StrategyKind::MeanReversion => Box::new(MeanReversion::from_config(config)?),
    };
    Ok(evaluator)
}

/// Directional view of a strategy on one bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stance {
    Long,
    Short,
    Flat,
    /// No new view; only rebalance an open position
    Keep,
}

/// Turn a stance into an action given the current position
pub(crate) fn stance_action(
    stance: Stance,
    window: &HistoryWindow<'_>,
    portfolio: &PortfolioState,
    config: &StrategyConfig,
) -> Result<Action, StrategyError> {
    let price = window.current().close;
    let held = portfolio.position_size;
    let target = portfolio
        .equity_at(price)
        .and_then(|equity| config.sizing.target_units(equity, price))
        .ok_or_else(|| {
            StrategyError::Fault(format!("position size overflowed at price {price}"))
        })?;

    let action = match stance {
        Stance::Flat if !held.is_zero() => Action::ExitPosition,
        Stance::Flat => Action::Hold,
        _ if target.is_zero() => Action::Hold,
        Stance::Long if held > Decimal::ZERO => rebalance(held, target, config),
        Stance::Long => Action::EnterLong(target),
        Stance::Short if held < Decimal::ZERO => rebalance(held, target, config),
        Stance::Short => Action::EnterShort(target),
        Stance::Keep if !held.is_zero() => rebalance(held, target, config),
        Stance::Keep => Action::Hold,
    };
    Ok(action)
}

fn rebalance(held: Decimal, target: Decimal, config: &StrategyConfig) -> Action {
    if config.sizing.needs_rebalance(held, target) {
        Action::Resize(target)
    } else {
        Action::Hold
    }
}
