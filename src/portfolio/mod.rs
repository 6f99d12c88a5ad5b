//! Portfolio module
//!
//! Cash, position and trade bookkeeping for a single run

mod costs;
mod ledger;
mod types;

pub use costs::CostModel;
pub use ledger::{LedgerOutcome, PortfolioLedger};
pub use types::{PortfolioState, Side, Trade, TradeEvent};

use crate::error::ErrorKind;
use crate::strategy::Action;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid price {price} at {timestamp}")]
    InvalidPrice {
        timestamp: DateTime<Utc>,
        price: Decimal,
    },
    #[error("Invalid size {size} in {action}")]
    InvalidSize { action: Action, size: Decimal },
    #[error("Arithmetic overflow computing {0}")]
    Overflow(&'static str),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidPrice { .. } => ErrorKind::DataUnavailable,
            LedgerError::InvalidSize { .. } | LedgerError::Overflow(_) => {
                ErrorKind::SimulationFault
            }
        }
    }
}
