//! In-memory bar source

use super::{BarQuery, BarSeries, MarketDataError, MarketDataSource, Timeframe};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds preloaded series keyed by symbol and timeframe
#[derive(Default, Clone)]
pub struct InMemoryBarSource {
    series: Arc<RwLock<HashMap<(String, Timeframe), BarSeries>>>,
}

impl InMemoryBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the series for a symbol/timeframe
    pub async fn insert(&self, symbol: impl Into<String>, timeframe: Timeframe, series: BarSeries) {
        let mut map = self.series.write().await;
        map.insert((symbol.into(), timeframe), series);
    }
}

#[async_trait]
impl MarketDataSource for InMemoryBarSource {
    async fn fetch(&self, query: &BarQuery) -> Result<BarSeries, MarketDataError> {
        query.validate()?;

        let map = self.series.read().await;
        let series = map
            .get(&(query.symbol.clone(), query.timeframe))
            .ok_or_else(|| MarketDataError::unavailable(query))?;

        let sliced = series.slice_for(query)?;
        if sliced.is_empty() {
            return Err(MarketDataError::unavailable(query));
        }
        Ok(sliced)
    }
}
