//! Relay CLI
//!
//! Command-line tool for operating the deployment relay: signing and sending
//! notifications by hand, and printing the labels that opt workloads in.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Deployment relay CLI", long_about = None)]
struct Cli {
    /// Relay URL
    #[arg(long, env = "RELAY_URL", default_value = "http://localhost:8080")]
    relay_url: String,

    /// Master signing key
    #[arg(long = "key", env = "RELAY_MASTER_KEY", hide_env_values = true)]
    master_key: Option<String>,

    /// Sign with the master key itself instead of the per-repository key
    #[arg(long)]
    direct: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::new(cli.relay_url, cli.master_key, cli.direct);

    handle_command(cli.command, &config).await
}
