//! Risk management module
//!
//! Position sizing, limits, and drawdown controls

mod limits;
mod sizing;
mod types;

pub use limits::{DrawdownMonitor, RiskLimits};
pub use sizing::{round_size, PositionSizing, SIZE_DP};
pub use types::{DowngradeReason, RiskWarning};
