//! Exponential backoff for transient store failures

use super::StoreError;
use crate::telemetry::{increment, CounterMetric};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff schedule for coordination-layer calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Run `call` until it succeeds, fails permanently, or attempts run out
///
/// Only [`StoreError::Unavailable`] is retried.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempts = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempts += 1;
        match call().await {
            Err(e) if e.is_transient() && attempts < policy.max_attempts => {
                tracing::warn!(
                    operation,
                    attempt = attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Store call failed, retrying..."
                );
                increment(CounterMetric::StoreRetries, 1);
                sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
            }
            result => return result,
        }
    }
}
