//! Undertow CLI - Command-line interface
//!
//! Streams a local media file to a cast receiver and remote-controls playback.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use undertow_core::UndertowConfig;
use undertow_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "undertow")]
#[command(about = "Stream a local media file to a cast receiver")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Cast device name or IP address (first discovered device otherwise)
    #[arg(short, long, global = true, env = "UNDERTOW_DEVICE")]
    device: Option<String>,

    /// Console log level
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the full debug log of this run
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())
        .context("failed to initialize logging")?;

    let mut config = UndertowConfig::from_env();
    if let Some(device) = cli.device {
        config.receiver.device = Some(device);
    }

    if let Err(e) = commands::handle_command(cli.command, config).await {
        tracing::error!("{e}");
        eprintln!("undertow: {}", e.user_message());
        std::process::exit(1);
    }

    Ok(())
}
