//! Portfolio types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Side of a signed position, `None` when flat
    pub fn of(position: Decimal) -> Option<Side> {
        if position > Decimal::ZERO {
            Some(Side::Long)
        } else if position < Decimal::ZERO {
            Some(Side::Short)
        } else {
            None
        }
    }

    /// +1 for long, -1 for short
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Cash and position after a bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash: Decimal,
    /// Signed units: positive long, negative short
    pub position_size: Decimal,
    /// Volume-weighted entry of the open position, zero when flat
    pub average_entry_price: Decimal,
    /// Realized P&L net of every commission paid
    pub realized_pnl: Decimal,
    /// Mark-to-market P&L of the open position at the last close
    pub unrealized_pnl: Decimal,
}

impl PortfolioState {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: initial_cash,
            position_size: Decimal::ZERO,
            average_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    /// Cash plus the position marked at `price`, `None` on overflow
    pub fn equity_at(&self, price: Decimal) -> Option<Decimal> {
        self.position_size
            .checked_mul(price)
            .and_then(|value| self.cash.checked_add(value))
    }

    pub fn is_flat(&self) -> bool {
        self.position_size.is_zero()
    }

    pub fn side(&self) -> Option<Side> {
        Side::of(self.position_size)
    }
}

/// One round trip, from first entry fill to final exit fill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Order of opening within the run, starting at 1
    pub seq: u32,
    pub side: Side,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: Option<DateTime<Utc>>,
    /// Average entry fill price
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    /// Largest number of units held during the trade
    pub size: Decimal,
    /// Net of fees, set once closed
    pub realized_pnl: Option<Decimal>,
    /// Commission paid on every fill of this trade
    pub fees: Decimal,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.exit_timestamp.is_none()
    }

    /// Holding time, once closed
    pub fn duration(&self) -> Option<Duration> {
        self.exit_timestamp.map(|exit| exit - self.entry_timestamp)
    }

    pub fn is_winner(&self) -> bool {
        self.realized_pnl.is_some_and(|pnl| pnl > Decimal::ZERO)
    }
}

/// Trade lifecycle change produced by one ledger application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "trade", rename_all = "snake_case")]
pub enum TradeEvent {
    Opened(Trade),
    Resized(Trade),
    Closed(Trade),
}

impl TradeEvent {
    pub fn trade(&self) -> &Trade {
        match self {
            TradeEvent::Opened(t) | TradeEvent::Resized(t) | TradeEvent::Closed(t) => t,
        }
    }
}
