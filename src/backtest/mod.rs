//! Backtesting module
//!
//! Replays historical bars through a strategy and portfolio ledger, producing
//! an equity curve, closed trades and summary metrics

mod analytics;
mod engine;
mod export;
mod request;
mod result;

pub use analytics::{max_drawdown, sharpe_ratio, SummaryMetrics};
pub use engine::{EngineState, RunControl, RunOutcome, SimulationEngine, SimulationReport};
pub use export::{equity_schema, trade_schema, write_equity_curve, write_trades};
pub use request::{BacktestRequest, JobId, RequestId};
pub use result::{BacktestResult, EquityPoint, JobStatus};
