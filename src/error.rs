//! User-visible error taxonomy
//!
//! Component errors stay typed inside their own modules; whatever ends a run
//! is classified into an [`ErrorKind`] and stored on the result as a
//! [`JobError`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failed or degraded run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Start after end, or an unrecognized timeframe
    InvalidRange,
    /// No bars exist for the requested range
    DataUnavailable,
    /// Unknown strategy kind or malformed parameters
    UnsupportedStrategy,
    /// A risk limit downgraded an action (warning only)
    RiskLimitBreach,
    /// The worker stopped making progress
    WorkerLost,
    /// Unexpected internal error
    SimulationFault,
    /// The run was cancelled before completion
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRange => "invalid_range",
            ErrorKind::DataUnavailable => "data_unavailable",
            ErrorKind::UnsupportedStrategy => "unsupported_strategy",
            ErrorKind::RiskLimitBreach => "risk_limit_breach",
            ErrorKind::WorkerLost => "worker_lost",
            ErrorKind::SimulationFault => "simulation_fault",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error recorded on a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for JobError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::WorkerLost).unwrap();
        assert_eq!(json, "\"worker_lost\"");
        let back: ErrorKind = serde_json::from_str("\"data_unavailable\"").unwrap();
        assert_eq!(back, ErrorKind::DataUnavailable);
    }

    #[test]
    fn test_job_error_display() {
        let err = JobError::new(
            ErrorKind::InvalidRange,
            "start 2024-02-01 is after end 2024-01-01",
        );
        assert_eq!(
            err.to_string(),
            "invalid_range: start 2024-02-01 is after end 2024-01-01"
        );
    }
}
