//! Configuration module
//!
//! Handles CLI configuration: relay URL and signing settings.

use anyhow::Result;
use relay_client::Signer;
use relay_core::KeyDerivation;

/// CLI configuration
#[derive(Clone)]
pub struct Config {
    /// URL of the relay service
    pub relay_url: String,

    master_key: Option<String>,

    pub derivation: KeyDerivation,
}

impl Config {
    pub fn new(relay_url: String, master_key: Option<String>, direct: bool) -> Self {
        Self {
            relay_url,
            master_key,
            derivation: if direct {
                KeyDerivation::Direct
            } else {
                KeyDerivation::PerRepository
            },
        }
    }

    /// Signer for the configured master key
    pub fn signer(&self) -> Result<Signer> {
        let key = self
            .master_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No signing key: pass --key or set RELAY_MASTER_KEY"))?;

        Ok(Signer::new(key.as_bytes(), self.derivation))
    }
}
