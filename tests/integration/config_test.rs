//! Configuration loading

use rust_decimal_macros::dec;
use std::io::Write;
use std::time::Duration;
use trading_hub::config::Config;
use trading_hub::telemetry::LogFormat;

#[test]
fn test_example_config_parses() {
    let config: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();
    assert_eq!(config.engine.commission_rate, dec!(0.001));
    assert_eq!(config.backtest.initial_capital, dec!(100000));
    assert_eq!(config.coordinator.workers, 4);
    assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
    assert!(config.telemetry.metrics_port.is_none());
}

#[test]
fn test_partial_config_file_loads() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[coordinator]\nworkers = 2\nheartbeat_interval_ms = 100").unwrap();

    let config = tokio_test::assert_ok!(Config::load(file.path()));
    let coordinator = config.coordinator.to_coordinator_config();
    assert_eq!(coordinator.workers, 2);
    assert_eq!(coordinator.heartbeat_interval, Duration::from_millis(100));
    assert_eq!(coordinator.max_run_duration, Duration::from_secs(300));
    assert_eq!(config.engine.slippage_rate, dec!(0));
}
