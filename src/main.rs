//! sqlpulse
//!
//! Run with: cargo run -- -C ./config/local.yml
//!
//! Environment variables:
//! - RUST_LOG: Log level (default: sqlpulse=info)
//! - Any variable referenced as `{{ .NAME }}` in the config file

use clap::Parser;
use sqlpulse::config::{Config, DEFAULT_CONFIG_PATH};
use sqlpulse::monitor::{Monitor, MonitorError};
use sqlpulse::signal::shutdown_signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "sqlpulse", version, about = "Send SQL query results as metrics")]
struct Opts {
    /// Path to the config file
    #[arg(short = 'C', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqlpulse=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let opts = Opts::parse();
    let config = Config::load(&opts.config)?;

    tracing::info!("sqlpulse configuration:");
    tracing::info!("  Data source: {}", config.data_source.redacted_dsn());
    tracing::info!("  Notifiers: {:?}", config.notifiers.keys());
    for rule in &config.rules {
        tracing::info!(
            "    - {} every {} via {}",
            rule.name,
            sqlpulse::monitor::rule::format_duration(&rule.interval),
            rule.notifier
        );
    }

    match Monitor::new(config).run(shutdown_signal()).await {
        Ok(()) => Ok(()),
        Err(MonitorError::Fatal(e)) => {
            tracing::error!(rule = %e.rule, error = %e, "Unable to report failure, exiting");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
