use clap::Parser;
use gateway::config::{DEFAULT_CONFIG_PATH, load_config_from_path};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Location telemetry ingestion gateway.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the gateway TOML config.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config_from_path(&args.config) {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            error!(path = %args.config.display(), error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log.level);
    info!(version = env!("CARGO_PKG_VERSION"), "gateway starting");

    match gateway::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "gateway failed");
            ExitCode::FAILURE
        }
    }
}
