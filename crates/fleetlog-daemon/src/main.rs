//! fleetlogd - vehicle log upload agent
//!
//! Watches log directories, uploads stable files to the object store on the
//! configured schedule, and keeps local disk bounded. Runs unattended under
//! the process supervisor; SIGTERM/SIGINT shut down gracefully, SIGHUP
//! reloads the configuration.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fleetlog_core::config::Config;
use fleetlog_daemon::orchestrator;

#[derive(Debug, Parser)]
#[command(name = "fleetlogd", version, about = "Vehicle log upload agent")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "/etc/fleetlog/config.yaml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    test_config: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    log_level: String,
}

fn filter_for(level: &str) -> &'static str {
    match level {
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for(&cli.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    if cli.test_config {
        return match Config::load_validated(&cli.config) {
            Ok(config) => {
                info!(
                    vehicle_id = %config.vehicle_id,
                    bucket = %config.s3.bucket,
                    directories = config.log_directories.len(),
                    "Configuration valid"
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Configuration error: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("FATAL: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = Config::load_validated(&cli.config)?;
    let agent = orchestrator::bootstrap(config).await?;
    agent.start().await?;
    info!("Running; SIGTERM/SIGINT to stop, SIGHUP to reload configuration");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                break;
            }
            _ = sigint.recv() => {
                info!("SIGINT received");
                break;
            }
            _ = sighup.recv() => {
                agent.reload_config(&cli.config);
            }
        }
    }

    agent.stop().await;
    Ok(())
}
