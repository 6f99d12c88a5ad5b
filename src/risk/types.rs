//! Risk management types

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an action was downgraded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DowngradeReason {
    /// Requested size exceeded the position limit
    MaxPositionSize { requested: Decimal, permitted: Decimal },
    /// Drawdown from peak reached the stop
    MaxDrawdown { drawdown: Decimal, limit: Decimal },
    /// Cash could not cover the requested size
    InsufficientCash { requested: Decimal, affordable: Decimal },
}

/// A risk downgrade recorded on the result
///
/// Warnings never fail a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskWarning {
    /// Bar at which the downgrade happened
    pub timestamp: DateTime<Utc>,
    /// Action requested by the strategy
    pub requested: String,
    /// Action actually applied
    pub applied: String,
    #[serde(flatten)]
    pub reason: DowngradeReason,
}

impl RiskWarning {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::RiskLimitBreach
    }
}

impl fmt::Display for RiskWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail = match &self.reason {
            DowngradeReason::MaxPositionSize {
                requested,
                permitted,
            } => format!("size {requested} above limit, permitted {permitted}"),
            DowngradeReason::MaxDrawdown { drawdown, limit } => {
                format!("drawdown {drawdown} reached stop {limit}")
            }
            DowngradeReason::InsufficientCash {
                requested,
                affordable,
            } => format!("size {requested} not covered by cash, affordable {affordable}"),
        };
        write!(
            f,
            "{} at {}: {} -> {} ({})",
            self.kind(),
            self.timestamp,
            self.requested,
            self.applied,
            detail
        )
    }
}
