use clap::Parser;
use trading_hub::cli::{Cli, Commands};
use trading_hub::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            toml::from_str(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    trading_hub::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Backtest(args) => {
            tracing::info!("Starting backtest");
            args.execute(&config).await?;
        }
        Commands::Generate(args) => {
            tracing::info!("Generating synthetic bars");
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Engine: commission={}, slippage={}",
                config.engine.commission_rate, config.engine.slippage_rate
            );
            println!(
                "  Backtest: capital={}, data_dir={}",
                config.backtest.initial_capital,
                config.backtest.data_dir.display()
            );
            println!(
                "  Coordinator: workers={}, queue={}, max_run={}s, reconcile={}s, heartbeat={}ms",
                config.coordinator.workers,
                config.coordinator.queue_capacity,
                config.coordinator.max_run_duration_secs,
                config.coordinator.reconcile_interval_secs,
                config.coordinator.heartbeat_interval_ms
            );
            println!(
                "  Retry: initial={}ms, max={}ms, attempts={}",
                config.coordinator.retry.initial_delay_ms,
                config.coordinator.retry.max_delay_ms,
                config.coordinator.retry.max_attempts
            );
            println!(
                "  Telemetry: level={}, format={:?}, metrics_port={:?}",
                config.telemetry.log_level,
                config.telemetry.log_format,
                config.telemetry.metrics_port
            );
        }
    }

    Ok(())
}
