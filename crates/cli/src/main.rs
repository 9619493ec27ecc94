//! DistribuTech CLI - sign in and talk to the inventory and order API

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, error, info};

#[derive(Parser)]
#[command(name = "distributech")]
#[command(about = "Command-line client for the DistribuTech API")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Log output format
    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,

    /// Configuration file (TOML)
    #[arg(short = 'c', long, global = true, env = "DISTRIBUTECH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the API root, e.g. https://erp.example.com/api
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Data directory for the persisted session
    #[arg(short = 'd', long, global = true)]
    data_dir: Option<PathBuf>,

    /// Timeout for the whole command in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "60")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.log_level.into(), cli.log_format)?;

    let config = config::resolve(cli.config.as_deref(), cli.api_url, cli.data_dir)?;
    info!(api_url = %config.api_url, "Starting DistribuTech CLI");

    // Watching runs until interrupted
    let unbounded = cli.timeout == 0 || cli.command.is_long_running();
    let run = cli.command.execute(config);

    let result = if unbounded {
        run.await
    } else {
        match tokio::time::timeout(Duration::from_secs(cli.timeout), run).await {
            Ok(result) => result,
            Err(_) => {
                error!("Command timed out after {} seconds", cli.timeout);
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = result {
        error!("Command failed: {e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
