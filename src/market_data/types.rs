//! Market data types

use super::MarketDataError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// One OHLCV observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl PriceBar {
    /// Bar whose four prices all equal `price`
    pub fn flat(timestamp: DateTime<Utc>, price: Decimal, volume: Decimal) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }
}

/// Supported bar intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Length of one bar
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
        }
    }

    /// Bars per year used to annualize per-bar returns
    ///
    /// Daily bars use 252 trading days; intraday bars assume a 24h market.
    pub fn periods_per_year(&self) -> u32 {
        match self {
            Timeframe::M1 => 525_600,
            Timeframe::M5 => 105_120,
            Timeframe::M15 => 35_040,
            Timeframe::H1 => 8_760,
            Timeframe::H4 => 2_190,
            Timeframe::D1 => 252,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MarketDataError::InvalidRange(format!("unrecognized timeframe '{s}'")))
    }
}

/// Parameters of a single fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarQuery {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// First calendar day included
    pub start: NaiveDate,
    /// Last calendar day included
    pub end: NaiveDate,
}

impl BarQuery {
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            start,
            end,
        }
    }

    /// Reject inverted ranges
    pub fn validate(&self) -> Result<(), MarketDataError> {
        if self.start > self.end {
            return Err(MarketDataError::InvalidRange(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Whether a bar timestamp falls inside the inclusive day range
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        let day = timestamp.date_naive();
        day >= self.start && day <= self.end
    }
}

/// Immutable, strictly time-ordered bar sequence
///
/// Cloning is cheap and every iteration replays the same bars, so a series
/// can be consumed any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarSeries {
    bars: Arc<[PriceBar]>,
}

impl BarSeries {
    /// Build a series, rejecting duplicate or out-of-order timestamps
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, MarketDataError> {
        if let Some(pair) = bars
            .windows(2)
            .find(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(MarketDataError::Malformed(format!(
                "bar at {} does not follow {}",
                pair[1].timestamp, pair[0].timestamp
            )));
        }
        Ok(Self { bars: bars.into() })
    }

    /// Sort by timestamp first, then validate
    pub fn from_unsorted(mut bars: Vec<PriceBar>) -> Result<Self, MarketDataError> {
        bars.sort_by_key(|bar| bar.timestamp);
        Self::new(bars)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn as_slice(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PriceBar> {
        self.bars.iter()
    }

    pub fn first(&self) -> Option<&PriceBar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    /// Bars inside the query's day range
    pub fn slice_for(&self, query: &BarQuery) -> Result<BarSeries, MarketDataError> {
        BarSeries::new(
            self.bars
                .iter()
                .filter(|bar| query.contains(bar.timestamp))
                .cloned()
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a BarSeries {
    type Item = &'a PriceBar;
    type IntoIter = std::slice::Iter<'a, PriceBar>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar(day: u32, close: Decimal) -> PriceBar {
        PriceBar::flat(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(), close, dec!(10))
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!("1d".parse::<Timeframe>().unwrap(), Timeframe::D1);
        assert_eq!("5M".parse::<Timeframe>().unwrap(), Timeframe::M5);
        assert!(matches!(
            "2w".parse::<Timeframe>(),
            Err(MarketDataError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_timeframe_serde_uses_short_names() {
        let json = serde_json::to_string(&Timeframe::H4).unwrap();
        assert_eq!(json, "\"4h\"");
    }

    #[test]
    fn test_query_rejects_inverted_range() {
        let query = BarQuery::new(
            "SYMBOL1",
            Timeframe::D1,
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        assert!(matches!(
            query.validate(),
            Err(MarketDataError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_series_rejects_duplicate_timestamps() {
        let result = BarSeries::new(vec![bar(1, dec!(100)), bar(1, dec!(101))]);
        assert!(matches!(result, Err(MarketDataError::Malformed(_))));
    }

    #[test]
    fn test_series_from_unsorted() {
        let series =
            BarSeries::from_unsorted(vec![bar(3, dec!(3)), bar(1, dec!(1)), bar(2, dec!(2))])
                .unwrap();
        let closes: Vec<Decimal> = series.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![dec!(1), dec!(2), dec!(3)]);
    }

    #[test]
    fn test_slice_for_is_inclusive() {
        let series = BarSeries::new((1..=10).map(|d| bar(d, Decimal::from(d))).collect()).unwrap();
        let query = BarQuery::new(
            "SYMBOL1",
            Timeframe::D1,
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
        );
        let sliced = series.slice_for(&query).unwrap();
        assert_eq!(sliced.len(), 3);
        assert_eq!(sliced.first().unwrap().close, dec!(3));
        assert_eq!(sliced.last().unwrap().close, dec!(5));
    }
}
