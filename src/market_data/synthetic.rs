//! Deterministic synthetic bars
//!
//! Generates a seeded random walk with integer arithmetic only, so the same
//! query produces bit-identical bars on every platform.

use super::{BarQuery, BarSeries, MarketDataError, MarketDataSource, PriceBar};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Upper bound on bars generated for one query
const MAX_BARS: usize = 500_000;

/// Random-walk bar generator
#[derive(Debug, Clone)]
pub struct SyntheticBarSource {
    /// Price of the first bar
    pub start_price: Decimal,
    /// Largest per-bar move in basis points
    pub max_step_bps: u64,
    /// Added to the per-symbol seed
    pub seed: u64,
}

impl Default for SyntheticBarSource {
    fn default() -> Self {
        Self {
            start_price: dec!(100),
            max_step_bps: 100,
            seed: 0,
        }
    }
}

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl SyntheticBarSource {
    pub fn new(start_price: Decimal, seed: u64) -> Self {
        Self {
            start_price,
            seed,
            ..Default::default()
        }
    }

    /// Generate bars for a query without validating it
    pub fn generate(&self, query: &BarQuery) -> Vec<PriceBar> {
        let key = format!("{}:{}", query.symbol, query.timeframe);
        let mut rng = Lcg(fnv1a(key.as_bytes()) ^ self.seed);

        let step = query.timeframe.duration();
        let Some(start) = query.start.and_hms_opt(0, 0, 0) else {
            return vec![];
        };
        let mut timestamp = Utc.from_utc_datetime(&start);
        let span = 2 * self.max_step_bps + 1;

        let mut bars = Vec::new();
        let mut close = self.start_price;

        while query.contains(timestamp) && bars.len() < MAX_BARS {
            let open = close;
            let move_bps = (rng.next() % span) as i64 - self.max_step_bps as i64;
            close = (open * (Decimal::ONE + Decimal::new(move_bps, 4))).round_dp(4);

            let wick_bps = (rng.next() % (self.max_step_bps / 2 + 1)) as i64;
            let wick = Decimal::new(wick_bps, 4);
            let high = (open.max(close) * (Decimal::ONE + wick)).round_dp(4);
            let low = (open.min(close) * (Decimal::ONE - wick)).round_dp(4);
            let volume = Decimal::from(1_000 + rng.next() % 9_000);

            bars.push(PriceBar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
            timestamp += step;
        }

        bars
    }
}

#[async_trait]
impl MarketDataSource for SyntheticBarSource {
    async fn fetch(&self, query: &BarQuery) -> Result<BarSeries, MarketDataError> {
        query.validate()?;
        let bars = self.generate(query);
        if bars.is_empty() {
            return Err(MarketDataError::unavailable(query));
        }
        BarSeries::new(bars)
    }
}
