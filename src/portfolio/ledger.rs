//! Portfolio ledger
//!
//! Applies one action per bar: resolves it into a signed target position,
//! enforces risk limits and cash, fills the difference at the bar's close
//! through the [`CostModel`] and keeps the open [`Trade`] up to date.

use super::{CostModel, LedgerError, PortfolioState, Side, Trade, TradeEvent};
use crate::market_data::PriceBar;
use crate::risk::{round_size, DowngradeReason, DrawdownMonitor, RiskLimits, RiskWarning};
use crate::strategy::Action;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

/// Result of applying one action
#[derive(Debug, Clone)]
pub struct LedgerOutcome {
    pub state: PortfolioState,
    /// Trade changes in fill order (a reversal yields Closed then Opened)
    pub events: Vec<TradeEvent>,
    /// Downgrades made to the requested action
    pub warnings: Vec<RiskWarning>,
    /// Action actually executed
    pub applied: Action,
}

/// Tracks the open trade and enforces limits for one run
#[derive(Debug)]
pub struct PortfolioLedger {
    limits: RiskLimits,
    costs: CostModel,
    drawdown: DrawdownMonitor,
    open_trade: Option<Trade>,
    /// Gross P&L realized so far by partial exits of the open trade
    open_gross: Decimal,
    next_seq: u32,
    applications: u64,
}

impl PortfolioLedger {
    pub fn new(initial_equity: Decimal, limits: RiskLimits, costs: CostModel) -> Self {
        Self {
            limits,
            costs,
            drawdown: DrawdownMonitor::new(initial_equity),
            open_trade: None,
            open_gross: Decimal::ZERO,
            next_seq: 1,
            applications: 0,
        }
    }

    /// Number of `apply` calls made
    pub fn applications(&self) -> u64 {
        self.applications
    }

    pub fn open_trade(&self) -> Option<&Trade> {
        self.open_trade.as_ref()
    }

    /// Current drawdown from peak equity
    pub fn current_drawdown(&self) -> Decimal {
        self.drawdown.current_drawdown()
    }

    /// Apply `action` at `bar`'s close
    pub fn apply(
        &mut self,
        action: Action,
        bar: &PriceBar,
        state: &PortfolioState,
    ) -> Result<LedgerOutcome, LedgerError> {
        check_price(bar)?;
        self.applications += 1;

        let close = bar.close;
        self.drawdown.update(checked(state.equity_at(close), "equity")?);

        let current = state.position_size;
        let mut target = requested_target(action, current)?;
        let mut reasons = Vec::new();

        if let Some(drawdown) = self.drawdown.breach(&self.limits) {
            if !target.is_zero() {
                reasons.push(DowngradeReason::MaxDrawdown {
                    drawdown,
                    limit: self.limits.max_drawdown_pct.unwrap_or(drawdown),
                });
                target = Decimal::ZERO;
            }
        }

        if let Some(max) = self.limits.max_position_size {
            if target.abs() > max {
                reasons.push(DowngradeReason::MaxPositionSize {
                    requested: target.abs(),
                    permitted: max,
                });
                target = max * signum(target);
            }
        }

        if let Some(side) = Side::of(target) {
            let held = if Side::of(current) == Some(side) {
                current.abs()
            } else {
                Decimal::ZERO
            };
            if target.abs() > held {
                let allowed = self.affordable_units(side, state, close)?.max(held);
                if target.abs() > allowed {
                    reasons.push(DowngradeReason::InsufficientCash {
                        requested: target.abs(),
                        affordable: allowed,
                    });
                    target = allowed * side.sign();
                }
            }
        }

        let mut next = state.clone();
        let mut events = Vec::new();
        if target != current {
            let crosses = !current.is_zero() && Side::of(target) != Side::of(current);
            if crosses {
                let price = checked(
                    self.costs.fill_price(close, current < Decimal::ZERO),
                    "fill price",
                )?;
                events.extend(self.fill(&mut next, -current, bar.timestamp, price)?);
            }
            let delta = target - next.position_size;
            if !delta.is_zero() {
                let price = checked(
                    self.costs.fill_price(close, delta > Decimal::ZERO),
                    "fill price",
                )?;
                events.extend(self.fill(&mut next, delta, bar.timestamp, price)?);
            }
        }
        next.unrealized_pnl = checked(
            close
                .checked_sub(next.average_entry_price)
                .and_then(|diff| next.position_size.checked_mul(diff)),
            "unrealized pnl",
        )?;

        let applied = applied_action(current, target);
        let warnings = reasons
            .into_iter()
            .map(|reason| {
                let warning = RiskWarning {
                    timestamp: bar.timestamp,
                    requested: action.to_string(),
                    applied: applied.to_string(),
                    reason,
                };
                debug!(%warning, "risk downgrade");
                warning
            })
            .collect();

        Ok(LedgerOutcome {
            state: next,
            events,
            warnings,
            applied,
        })
    }

    /// Close any open position at exactly `bar`'s close
    ///
    /// Commission is charged; slippage is not.
    pub fn liquidate(
        &mut self,
        bar: &PriceBar,
        state: &PortfolioState,
    ) -> Result<LedgerOutcome, LedgerError> {
        check_price(bar)?;
        let mut next = state.clone();
        let mut events = Vec::new();
        let applied = if state.is_flat() {
            Action::Hold
        } else {
            events.extend(self.fill(&mut next, -state.position_size, bar.timestamp, bar.close)?);
            Action::ExitPosition
        };
        next.unrealized_pnl = Decimal::ZERO;
        Ok(LedgerOutcome {
            state: next,
            events,
            warnings: Vec::new(),
            applied,
        })
    }

    /// Most units of `side` the portfolio can carry at `close`
    fn affordable_units(
        &self,
        side: Side,
        state: &PortfolioState,
        close: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let units = match side {
            Side::Long => {
                let unit_cost = self
                    .costs
                    .fill_price(close, true)
                    .and_then(|price| price.checked_mul(Decimal::ONE + self.costs.commission_rate));
                let unit_cost = checked(unit_cost, "unit cost")?;
                let mut cash = state.cash;
                if state.position_size < Decimal::ZERO {
                    let cover = state.position_size.abs().checked_mul(unit_cost);
                    let covered = cover.and_then(|cover| cash.checked_sub(cover));
                    cash = checked(covered, "cover cost")?;
                }
                let held = state.position_size.max(Decimal::ZERO);
                let buyable = checked(cash.checked_div(unit_cost), "affordable units")?;
                held + round_size(buyable.max(Decimal::ZERO))
            }
            // shorts are capped at one times equity in notional
            Side::Short => {
                let equity = checked(state.equity_at(close), "equity")?;
                let sellable = checked(equity.checked_div(close), "affordable units")?;
                round_size(sellable.max(Decimal::ZERO))
            }
        };
        Ok(units)
    }

    /// Fill `delta` units at `price`; never crosses zero
    ///
    /// Every amount is computed before `state` is touched, so an overflow
    /// leaves the portfolio as it was.
    fn fill(
        &mut self,
        state: &mut PortfolioState,
        delta: Decimal,
        timestamp: DateTime<Utc>,
        price: Decimal,
    ) -> Result<Option<TradeEvent>, LedgerError> {
        let fee = checked(self.costs.commission(delta, price), "commission")?;
        let before = state.position_size;
        let after = before + delta;
        let cash = checked(
            delta
                .checked_mul(price)
                .and_then(|notional| notional.checked_add(fee))
                .and_then(|cost| state.cash.checked_sub(cost)),
            "cash",
        )?;
        let average = if !before.is_zero() && after.abs() > before.abs() {
            let average = before
                .abs()
                .checked_mul(state.average_entry_price)
                .zip(delta.abs().checked_mul(price))
                .and_then(|(held, added)| held.checked_add(added))
                .and_then(|cost| cost.checked_div(after.abs()));
            Some(checked(average, "average entry")?)
        } else {
            None
        };
        let gross = match self.open_trade.as_ref() {
            Some(trade) if !before.is_zero() && after.abs() <= before.abs() => {
                let gross = price
                    .checked_sub(state.average_entry_price)
                    .and_then(|diff| diff.checked_mul(delta.abs()))
                    .map(|gross| gross * trade.side.sign());
                checked(gross, "realized pnl")?
            }
            _ => Decimal::ZERO,
        };

        state.cash = cash;
        state.realized_pnl -= fee;
        state.position_size = after;

        if before.is_zero() {
            let Some(side) = Side::of(delta) else {
                return Ok(None);
            };
            let trade = Trade {
                seq: self.next_seq,
                side,
                entry_timestamp: timestamp,
                exit_timestamp: None,
                entry_price: price,
                exit_price: None,
                size: delta.abs(),
                realized_pnl: None,
                fees: fee,
            };
            self.next_seq += 1;
            self.open_gross = Decimal::ZERO;
            state.average_entry_price = price;
            self.open_trade = Some(trade.clone());
            return Ok(Some(TradeEvent::Opened(trade)));
        }

        let Some(mut trade) = self.open_trade.take() else {
            return Ok(None);
        };
        trade.fees += fee;

        if let Some(average) = average {
            state.average_entry_price = average;
            trade.entry_price = average;
            trade.size = trade.size.max(after.abs());
            self.open_trade = Some(trade.clone());
            return Ok(Some(TradeEvent::Resized(trade)));
        }

        state.realized_pnl += gross;
        self.open_gross += gross;

        if after.is_zero() {
            trade.exit_timestamp = Some(timestamp);
            trade.exit_price = Some(price);
            trade.realized_pnl = Some(self.open_gross - trade.fees);
            state.average_entry_price = Decimal::ZERO;
            self.open_gross = Decimal::ZERO;
            Ok(Some(TradeEvent::Closed(trade)))
        } else {
            self.open_trade = Some(trade.clone());
            Ok(Some(TradeEvent::Resized(trade)))
        }
    }
}

fn checked(value: Option<Decimal>, what: &'static str) -> Result<Decimal, LedgerError> {
    value.ok_or(LedgerError::Overflow(what))
}

fn check_price(bar: &PriceBar) -> Result<(), LedgerError> {
    if bar.close <= Decimal::ZERO {
        return Err(LedgerError::InvalidPrice {
            timestamp: bar.timestamp,
            price: bar.close,
        });
    }
    Ok(())
}

fn signum(value: Decimal) -> Decimal {
    Side::of(value).map(|s| s.sign()).unwrap_or(Decimal::ZERO)
}

/// Signed position the action asks for
fn requested_target(action: Action, current: Decimal) -> Result<Decimal, LedgerError> {
    let size = match action {
        Action::Hold => return Ok(current),
        Action::ExitPosition => return Ok(Decimal::ZERO),
        Action::EnterLong(size) | Action::EnterShort(size) | Action::Resize(size) => size,
    };
    if size < Decimal::ZERO {
        return Err(LedgerError::InvalidSize { action, size });
    }
    Ok(match action {
        Action::EnterLong(_) => size,
        Action::EnterShort(_) => -size,
        // resizing nothing is a no-op
        _ => size * signum(current),
    })
}

fn applied_action(current: Decimal, target: Decimal) -> Action {
    if target == current {
        Action::Hold
    } else if target.is_zero() {
        Action::ExitPosition
    } else if Side::of(target) != Side::of(current) {
        match Side::of(target) {
            Some(Side::Short) => Action::EnterShort(target.abs()),
            _ => Action::EnterLong(target.abs()),
        }
    } else {
        Action::Resize(target.abs())
    }
}
