//! Label command handler

use anyhow::Result;
use colored::*;
use relay_core::{LabelTarget, label_key_for};

/// Print `key=value` for a workload tracking `branch` of `repository`
pub fn print_label(prefix: &str, repository: &str, branch: &str, container: usize) -> Result<()> {
    let (key, value) = label(prefix, repository, branch, container)?;

    println!("{}={}", key, value);
    eprintln!(
        "{}",
        format!("kubectl label deployment <name> {}={}", key, value).dimmed()
    );

    Ok(())
}

fn label(prefix: &str, repository: &str, branch: &str, container: usize) -> Result<(String, String)> {
    let value = LabelTarget::new(branch, container)?;
    Ok((label_key_for(prefix, repository), value.to_string()))
}
