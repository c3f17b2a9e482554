//! Confluence CLI - Command-line interface
//!
//! Runs the torrent-aware HTTP server and inspects cached metainfo.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use confluence_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "confluence")]
#[command(about = "HTTP front end holding torrents alive across requests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the last-run log file
    #[arg(long)]
    logs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;

    commands::handle_command(cli.command).await
}
