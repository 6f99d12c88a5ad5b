//! Backtest analytics and reporting

use super::EquityPoint;
use crate::market_data::Timeframe;
use crate::portfolio::Trade;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Summary statistics of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    /// Final equity / initial capital - 1
    pub total_return: Decimal,
    /// Largest peak-to-trough decline of the equity curve, as a fraction
    pub max_drawdown: Decimal,
    /// Winning closed trades / closed trades
    pub win_rate: Decimal,
    /// Annualized mean/stdev of per-bar returns
    pub sharpe_ratio: Decimal,
    /// Final equity minus initial capital
    pub net_pnl: Decimal,
    /// Gross wins / gross losses, absent without losing trades
    pub profit_factor: Option<Decimal>,
    pub total_trades: usize,
    pub avg_trade_duration_secs: i64,
    pub total_fees: Decimal,
}

impl SummaryMetrics {
    /// Compute metrics over a full equity curve and trade list
    ///
    /// Totals saturate at the `Decimal` bounds and ratios that leave the
    /// range are reported as undefined.
    pub fn compute(
        curve: &[EquityPoint],
        trades: &[Trade],
        initial_capital: Decimal,
        timeframe: Timeframe,
    ) -> Self {
        let final_equity = curve.last().map(|p| p.equity).unwrap_or(initial_capital);
        let total_return = final_equity
            .checked_div(initial_capital)
            .map(|ratio| ratio.saturating_sub(Decimal::ONE))
            .unwrap_or(Decimal::ZERO);

        let closed: Vec<&Trade> = trades.iter().filter(|t| !t.is_open()).collect();
        let winners = closed.iter().filter(|t| t.is_winner()).count();
        let win_rate = if closed.is_empty() {
            Decimal::ZERO
        } else {
            Decimal::from(winners) / Decimal::from(closed.len())
        };

        let gross_wins = saturating_sum(
            closed
                .iter()
                .filter_map(|t| t.realized_pnl)
                .filter(|p| *p > Decimal::ZERO),
        );
        let gross_losses = saturating_sum(
            closed
                .iter()
                .filter_map(|t| t.realized_pnl)
                .filter(|p| *p < Decimal::ZERO)
                .map(|p| p.abs()),
        );
        let profit_factor = gross_wins.checked_div(gross_losses);

        let durations: Vec<i64> = closed
            .iter()
            .filter_map(|t| t.duration())
            .map(|d| d.num_seconds())
            .collect();
        let avg_trade_duration_secs = if durations.is_empty() {
            0
        } else {
            durations.iter().sum::<i64>() / durations.len() as i64
        };

        Self {
            total_return,
            max_drawdown: max_drawdown(curve),
            win_rate,
            sharpe_ratio: sharpe_ratio(curve, timeframe),
            net_pnl: final_equity.saturating_sub(initial_capital),
            profit_factor,
            total_trades: closed.len(),
            avg_trade_duration_secs,
            total_fees: saturating_sum(trades.iter().map(|t| t.fees)),
        }
    }

    /// Format as table for CLI output
    pub fn format_table(&self) -> String {
        let profit_factor = self
            .profit_factor
            .map(|pf| format!("{:.2}", pf))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            r#"
══════════════════════════════════════════════════════
               BACKTEST RESULTS
══════════════════════════════════════════════════════

PERFORMANCE
───────────────────────────────────────────────────────
Net P&L:          {:+.2} ({:+.2}%)
Sharpe Ratio:     {:.2}
Max Drawdown:     {:.2}%
Win Rate:         {:.1}%
Profit Factor:    {}

ACTIVITY
───────────────────────────────────────────────────────
Total Trades:     {}
Avg Duration:     {}s
Total Fees:       {:.2}
══════════════════════════════════════════════════════
"#,
            self.net_pnl,
            self.total_return.saturating_mul(dec!(100)),
            self.sharpe_ratio,
            self.max_drawdown.saturating_mul(dec!(100)),
            self.win_rate * dec!(100),
            profit_factor,
            self.total_trades,
            self.avg_trade_duration_secs,
            self.total_fees,
        )
    }
}

/// Largest peak-to-trough decline as a fraction of the peak
pub fn max_drawdown(curve: &[EquityPoint]) -> Decimal {
    let mut peak = match curve.first() {
        Some(p) => p.equity,
        None => return Decimal::ZERO,
    };
    let mut worst = Decimal::ZERO;
    for point in curve {
        if point.equity > peak {
            peak = point.equity;
        } else if peak > Decimal::ZERO {
            if let Some(drawdown) = peak.saturating_sub(point.equity).checked_div(peak) {
                worst = worst.max(drawdown);
            }
        }
    }
    worst
}

/// Annualized Sharpe-like ratio of per-bar returns, zero when undefined
pub fn sharpe_ratio(curve: &[EquityPoint], timeframe: Timeframe) -> Decimal {
    let returns: Vec<Decimal> = curve
        .windows(2)
        .filter_map(|w| w[1].equity.checked_div(w[0].equity))
        .map(|ratio| ratio.saturating_sub(Decimal::ONE))
        .collect();
    if returns.len() < 2 {
        return Decimal::ZERO;
    }
    annualized_ratio(&returns, timeframe).unwrap_or(Decimal::ZERO)
}

fn annualized_ratio(returns: &[Decimal], timeframe: Timeframe) -> Option<Decimal> {
    let n = Decimal::from(returns.len());
    let total = returns
        .iter()
        .try_fold(Decimal::ZERO, |acc, r| acc.checked_add(*r))?;
    let mean = total / n;
    let squares = returns.iter().try_fold(Decimal::ZERO, |acc, r| {
        let diff = r.checked_sub(mean)?;
        acc.checked_add(diff.checked_mul(diff)?)
    })?;
    let std = (squares / (n - Decimal::ONE)).sqrt()?;
    if std.is_zero() {
        return None;
    }
    let annualization = Decimal::from(timeframe.periods_per_year())
        .sqrt()
        .unwrap_or(Decimal::ONE);
    mean.checked_div(std)?.checked_mul(annualization)
}

fn saturating_sum(values: impl Iterator<Item = Decimal>) -> Decimal {
    values.fold(Decimal::ZERO, |acc, value| acc.saturating_add(value))
}
