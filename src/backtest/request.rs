//! Backtest requests and identifiers

use crate::market_data::{BarQuery, Timeframe};
use crate::portfolio::CostModel;
use crate::strategy::StrategyConfig;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Identifies one backtest request across resubmissions
    RequestId
);
id_type!(
    /// Identifies one execution attempt of a request
    JobId
);

/// Unit of work scheduled by the coordinator
///
/// The strategy is a snapshot: later edits to the bot do not change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub id: RequestId,
    pub bot_id: String,
    pub strategy: StrategyConfig,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: Decimal,
    #[serde(default)]
    pub costs: CostModel,
    pub submitted_at: DateTime<Utc>,
}

impl BacktestRequest {
    pub fn new(
        bot_id: impl Into<String>,
        strategy: StrategyConfig,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
        initial_capital: Decimal,
    ) -> Self {
        Self {
            id: RequestId::new(),
            bot_id: bot_id.into(),
            strategy,
            symbol: symbol.into(),
            timeframe,
            start,
            end,
            initial_capital,
            costs: CostModel::zero(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_costs(mut self, costs: CostModel) -> Self {
        self.costs = costs;
        self
    }

    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = id;
        self
    }

    /// Bar query covering the requested range
    pub fn query(&self) -> BarQuery {
        BarQuery::new(self.symbol.clone(), self.timeframe, self.start, self.end)
    }
}
