//! Notification command handlers
//!
//! Signs notification files and delivers them to the relay.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use colored::*;
use relay_client::RelayClient;
use relay_core::Notification;

use crate::config::Config;

/// Print the signature of a notification file
pub fn sign(file: &Path, config: &Config) -> Result<()> {
    let body = read_payload(file)?;
    let signature = config.signer()?.sign(&body)?;

    println!("{}", signature);

    Ok(())
}

/// Sign a notification file and send it to the relay
pub async fn send(file: &Path, config: &Config) -> Result<()> {
    let body = read_payload(file)?;

    let target = Notification::decode(&body)
        .and_then(|notification| notification.normalize())
        .context("Notification would be rejected by the relay")?;

    println!(
        "{} {} ({}) to {}",
        "Sending".bold(),
        target.image.cyan(),
        target.branch,
        config.relay_url
    );

    let client = RelayClient::new(&config.relay_url);
    let signer = config.signer()?;

    match client.send_signed(body, &signer).await {
        Ok(ack) => {
            println!("{} {}", "✓".green(), ack.message);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            Err(e.into())
        }
    }
}

fn read_payload(file: &Path) -> Result<Vec<u8>> {
    if file.as_os_str() == "-" {
        let mut body = Vec::new();
        std::io::stdin()
            .read_to_end(&mut body)
            .context("Failed to read notification from stdin")?;
        return Ok(body);
    }

    std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))
}
