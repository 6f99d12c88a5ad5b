//! Strategy configuration and action types

use super::StrategyError;
use crate::risk::{PositionSizing, RiskLimits};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Decision produced for one bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "size", rename_all = "snake_case")]
pub enum Action {
    Hold,
    /// Open (or re-target) a long position of this many units
    EnterLong(Decimal),
    /// Open (or re-target) a short position of this many units
    EnterShort(Decimal),
    /// Close whatever is open
    ExitPosition,
    /// Change the open position to this many units, keeping its direction
    Resize(Decimal),
}

impl Action {
    /// Whether the action can add exposure
    pub fn adds_exposure(&self) -> bool {
        matches!(
            self,
            Action::EnterLong(_) | Action::EnterShort(_) | Action::Resize(_)
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Hold => write!(f, "hold"),
            Action::EnterLong(size) => write!(f, "enter_long({size})"),
            Action::EnterShort(size) => write!(f, "enter_short({size})"),
            Action::ExitPosition => write!(f, "exit_position"),
            Action::Resize(size) => write!(f, "resize({size})"),
        }
    }
}

/// Supported strategy families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MovingAverageCross,
    Breakout,
    MeanReversion,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::MovingAverageCross => "ma_cross",
            StrategyKind::Breakout => "breakout",
            StrategyKind::MeanReversion => "mean_reversion",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "ma_cross" | "moving_average_cross" | "sma_cross" => {
                Ok(StrategyKind::MovingAverageCross)
            }
            "breakout" | "channel_breakout" => Ok(StrategyKind::Breakout),
            "mean_reversion" | "zscore_reversion" => Ok(StrategyKind::MeanReversion),
            _ => Err(StrategyError::UnsupportedStrategy(s.to_string())),
        }
    }
}

/// Strategy parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Flag(bool),
    Number(Decimal),
    Text(String),
}

impl From<Decimal> for ParamValue {
    fn from(value: Decimal) -> Self {
        ParamValue::Number(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Number(Decimal::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Flag(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl ParamValue {
    /// Parse a CLI-style `value`, preferring numbers and flags over text
    pub fn parse(raw: &str) -> Self {
        if let Ok(flag) = raw.parse::<bool>() {
            return ParamValue::Flag(flag);
        }
        match Decimal::from_str(raw) {
            Ok(number) => ParamValue::Number(number),
            Err(_) => ParamValue::Text(raw.to_string()),
        }
    }
}

/// Immutable description of a strategy, snapshotted into each request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy kind as supplied by the bot (validated on use)
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub sizing: PositionSizing,
    #[serde(default)]
    pub risk: RiskLimits,
}

impl StrategyConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: BTreeMap::new(),
            sizing: PositionSizing::default(),
            risk: RiskLimits::default(),
        }
    }

    /// Moving-average cross with the given windows
    pub fn ma_cross(fast: i64, slow: i64) -> Self {
        Self::new(StrategyKind::MovingAverageCross.as_str())
            .with_param("fast", fast)
            .with_param("slow", slow)
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_sizing(mut self, sizing: PositionSizing) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn with_risk(mut self, risk: RiskLimits) -> Self {
        self.risk = risk;
        self
    }

    /// Resolve the declared kind
    pub fn strategy_kind(&self) -> Result<StrategyKind, StrategyError> {
        self.kind.parse()
    }

    /// Numeric parameter, if present
    pub fn number(&self, name: &str) -> Result<Option<Decimal>, StrategyError> {
        match self.params.get(name) {
            None => Ok(None),
            Some(ParamValue::Number(n)) => Ok(Some(*n)),
            Some(ParamValue::Text(raw)) => Decimal::from_str(raw).map(Some).map_err(|_| {
                StrategyError::invalid(name, format!("expected a number, got '{raw}'"))
            }),
            Some(ParamValue::Flag(_)) => Err(StrategyError::invalid(name, "expected a number")),
        }
    }

    /// Positive integer parameter with a default
    pub fn period(&self, name: &str, default: Option<usize>) -> Result<usize, StrategyError> {
        let value = match (self.number(name)?, default) {
            (Some(n), _) => n,
            (None, Some(d)) => return Ok(d),
            (None, None) => return Err(StrategyError::invalid(name, "missing required parameter")),
        };
        if !value.fract().is_zero() || value < Decimal::ONE {
            return Err(StrategyError::invalid(
                name,
                format!("expected a positive integer, got {value}"),
            ));
        }
        value
            .to_usize()
            .ok_or_else(|| StrategyError::invalid(name, format!("{value} is too large")))
    }

    /// Boolean parameter, defaulting to false
    pub fn flag(&self, name: &str) -> Result<bool, StrategyError> {
        match self.params.get(name) {
            None => Ok(false),
            Some(ParamValue::Flag(b)) => Ok(*b),
            Some(ParamValue::Number(n)) => Ok(!n.is_zero()),
            Some(ParamValue::Text(raw)) => raw.parse::<bool>().map_err(|_| {
                StrategyError::invalid(name, format!("expected true/false, got '{raw}'"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_parse_aliases() {
        assert_eq!(
            "moving-average-cross".parse::<StrategyKind>().unwrap(),
            StrategyKind::MovingAverageCross
        );
        assert_eq!("Breakout".parse::<StrategyKind>().unwrap(), StrategyKind::Breakout);
        assert!(matches!(
            "wheel".parse::<StrategyKind>(),
            Err(StrategyError::UnsupportedStrategy(_))
        ));
    }

    #[test]
    fn test_param_value_parse() {
        assert_eq!(ParamValue::parse("5"), ParamValue::Number(dec!(5)));
        assert_eq!(ParamValue::parse("true"), ParamValue::Flag(true));
        assert_eq!(ParamValue::parse("abc"), ParamValue::Text("abc".into()));
    }

    #[test]
    fn test_period_param() {
        let config = StrategyConfig::ma_cross(5, 20);
        assert_eq!(config.period("fast", None).unwrap(), 5);
        assert_eq!(config.period("missing", Some(7)).unwrap(), 7);
        assert!(config.period("missing", None).is_err());

        let bad = StrategyConfig::new("ma_cross").with_param("fast", dec!(2.5));
        assert!(matches!(
            bad.period("fast", None),
            Err(StrategyError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_period_accepts_scaled_integer() {
        let config = StrategyConfig::new("ma_cross").with_param("fast", dec!(5.00));
        assert_eq!(config.period("fast", None).unwrap(), 5);
    }

    #[test]
    fn test_flag_param() {
        let config = StrategyConfig::new("breakout")
            .with_param("allow_short", "true")
            .with_param("other", 0i64);
        assert!(config.flag("allow_short").unwrap());
        assert!(!config.flag("other").unwrap());
        assert!(!config.flag("absent").unwrap());
    }

    #[test]
    fn test_config_deserialize_json() {
        let json = r#"{
            "kind": "ma_cross",
            "params": {"fast": 5, "slow": "20", "allow_short": true},
            "sizing": {"rule": "fixed_units", "units": 1},
            "risk": {"max_position_size": 1}
        }"#;
        let config: StrategyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.period("fast", None).unwrap(), 5);
        assert_eq!(config.period("slow", None).unwrap(), 20);
        assert!(config.flag("allow_short").unwrap());
        assert_eq!(config.risk.max_position_size, Some(dec!(1)));
    }

    #[test]
    fn test_action_serde() {
        let json = serde_json::to_string(&Action::EnterLong(dec!(2))).unwrap();
        assert_eq!(json, r#"{"action":"enter_long","size":"2"}"#);
        let hold: Action = serde_json::from_str(r#"{"action":"hold"}"#).unwrap();
        assert_eq!(hold, Action::Hold);
    }
}
