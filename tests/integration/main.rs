//! Integration tests for trading-hub

mod config_test;
mod coordinator_test;
mod engine_test;
mod market_data_test;
mod support;
