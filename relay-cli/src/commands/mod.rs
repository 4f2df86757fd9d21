//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod label;
mod notify;

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the signature header value for a notification
    Sign {
        /// Notification JSON file, `-` for stdin
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Sign a notification and deliver it to the relay
    Send {
        /// Notification JSON file, `-` for stdin
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Print the label that opts a workload in to deployments
    Label {
        /// Repository, as named in notifications
        #[arg(short, long)]
        repository: String,

        /// Branch the workload tracks
        #[arg(short, long)]
        branch: String,

        /// Index of the container to update
        #[arg(short, long, default_value_t = 0)]
        container: usize,

        /// Label key prefix
        #[arg(long, default_value = relay_core::DEFAULT_LABEL_PREFIX)]
        prefix: String,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Sign { file } => notify::sign(&file, config),
        Commands::Send { file } => notify::send(&file, config).await,
        Commands::Label {
            repository,
            branch,
            container,
            prefix,
        } => label::print_label(&prefix, &repository, &branch, container),
    }
}
