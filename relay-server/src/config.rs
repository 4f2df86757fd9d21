//! Server configuration
//!
//! Loaded from environment variables once at startup. Invalid or weak
//! settings stop the process before it starts listening.

use std::fmt;
use std::time::Duration;

use relay_core::{DEFAULT_LABEL_PREFIX, KeyDerivation, KeyRing};

use crate::service::RetryPolicy;

/// Where signing keys come from
#[derive(Clone)]
pub enum SecretSource {
    /// Keys given directly in the environment
    Inline {
        current: Vec<u8>,
        previous: Option<Vec<u8>>,
    },
    /// Keys read from a cluster Secret
    Cluster { namespace: String, name: String },
}

impl fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::Inline { previous, .. } => f
                .debug_struct("Inline")
                .field("current", &"<redacted>")
                .field("previous", &previous.as_ref().map(|_| "<redacted>"))
                .finish(),
            SecretSource::Cluster { namespace, name } => f
                .debug_struct("Cluster")
                .field("namespace", namespace)
                .field("name", name)
                .finish(),
        }
    }
}

/// Relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to (e.g., "0.0.0.0:8080")
    pub bind_addr: String,

    /// Incoming-webhook URL of the chat channel
    pub slack_url: String,

    pub secret_source: SecretSource,

    pub key_derivation: KeyDerivation,

    /// Prefix of the deployment label key
    pub label_prefix: String,

    pub retry: RetryPolicy,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - SLACK_URL (required)
    /// - WEBHOOK_SECRET, WEBHOOK_SECRET_PREVIOUS (inline keys), or
    ///   SECRET_NAMESPACE and SECRET_NAME (cluster Secret)
    /// - PORT (optional, default: 8080) or RELAY_BIND_ADDR (optional, full address)
    /// - KEY_DERIVATION (optional, default: per-repository)
    /// - LABEL_PREFIX (optional, default: ki-cd)
    /// - CONFLICT_RETRY_ATTEMPTS (optional, default: 5)
    /// - CONFLICT_RETRY_BACKOFF_MS (optional, default: 10)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Creates configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let slack_url = var("SLACK_URL")
            .ok_or_else(|| anyhow::anyhow!("SLACK_URL environment variable not set"))?;

        let bind_addr = match var("RELAY_BIND_ADDR") {
            Some(addr) => addr,
            None => {
                let port = match var("PORT") {
                    Some(port) => port
                        .parse::<u16>()
                        .map_err(|_| anyhow::anyhow!("PORT must be a port number, got '{}'", port))?,
                    None => 8080,
                };
                format!("0.0.0.0:{}", port)
            }
        };

        let secret_source = match (var("WEBHOOK_SECRET"), var("SECRET_NAMESPACE"), var("SECRET_NAME")) {
            (Some(current), None, None) => SecretSource::Inline {
                current: current.into_bytes(),
                previous: var("WEBHOOK_SECRET_PREVIOUS").map(String::into_bytes),
            },
            (None, Some(namespace), Some(name)) => SecretSource::Cluster { namespace, name },
            (Some(_), _, _) => anyhow::bail!(
                "WEBHOOK_SECRET and SECRET_NAMESPACE/SECRET_NAME are mutually exclusive"
            ),
            (None, _, _) => anyhow::bail!(
                "No webhook secret configured: set WEBHOOK_SECRET or both SECRET_NAMESPACE and SECRET_NAME"
            ),
        };

        let key_derivation = match var("KEY_DERIVATION") {
            Some(value) => value.parse::<KeyDerivation>()?,
            None => KeyDerivation::default(),
        };

        let label_prefix = var("LABEL_PREFIX").unwrap_or_else(|| DEFAULT_LABEL_PREFIX.to_string());

        let defaults = RetryPolicy::default();
        let max_attempts = match var("CONFLICT_RETRY_ATTEMPTS") {
            Some(value) => value.parse::<u32>().map_err(|_| {
                anyhow::anyhow!("CONFLICT_RETRY_ATTEMPTS must be a number, got '{}'", value)
            })?,
            None => defaults.max_attempts,
        };
        let initial_backoff = match var("CONFLICT_RETRY_BACKOFF_MS") {
            Some(value) => value.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                anyhow::anyhow!("CONFLICT_RETRY_BACKOFF_MS must be a number of milliseconds, got '{}'", value)
            })?,
            None => defaults.initial_backoff,
        };

        let config = Self {
            bind_addr,
            slack_url,
            secret_source,
            key_derivation,
            label_prefix,
            retry: RetryPolicy::new(max_attempts, initial_backoff),
        };
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.slack_url.starts_with("http://") && !self.slack_url.starts_with("https://") {
            anyhow::bail!("SLACK_URL must start with http:// or https://");
        }

        if let Some(ring) = self.inline_key_ring() {
            ring?;
        }

        if self.label_prefix.trim_matches('/').is_empty() {
            anyhow::bail!("LABEL_PREFIX cannot be empty");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("CONFLICT_RETRY_ATTEMPTS must be greater than 0");
        }

        Ok(())
    }

    /// Key ring built from inline keys, if keys are configured inline
    pub fn inline_key_ring(&self) -> Option<Result<KeyRing, relay_core::KeyError>> {
        match &self.secret_source {
            SecretSource::Inline { current, previous } => {
                Some(KeyRing::from_rotation(current.clone(), previous.clone()))
            }
            SecretSource::Cluster { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const STRONG: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_with_inline_secret() {
        let config = load(&[
            ("SLACK_URL", "https://hooks.slack.com/services/x"),
            ("WEBHOOK_SECRET", STRONG),
        ])
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.label_prefix, "ki-cd");
        assert_eq!(config.key_derivation, KeyDerivation::PerRepository);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.inline_key_ring().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_cluster_secret_and_overrides() {
        let config = load(&[
            ("SLACK_URL", "http://chat.local/hook"),
            ("SECRET_NAMESPACE", "relay"),
            ("SECRET_NAME", "webhook-keys"),
            ("PORT", "9000"),
            ("KEY_DERIVATION", "direct"),
            ("LABEL_PREFIX", "deploy"),
            ("CONFLICT_RETRY_ATTEMPTS", "8"),
            ("CONFLICT_RETRY_BACKOFF_MS", "50"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.key_derivation, KeyDerivation::Direct);
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(50));
        assert!(config.inline_key_ring().is_none());
        assert!(matches!(
            config.secret_source,
            SecretSource::Cluster { ref namespace, ref name } if namespace == "relay" && name == "webhook-keys"
        ));
    }

    #[test]
    fn test_bind_addr_overrides_port() {
        let config = load(&[
            ("SLACK_URL", "http://chat.local/hook"),
            ("WEBHOOK_SECRET", STRONG),
            ("PORT", "9000"),
            ("RELAY_BIND_ADDR", "127.0.0.1:7000"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:7000");
    }

    #[test]
    fn test_weak_or_missing_secret_is_refused() {
        assert!(load(&[("SLACK_URL", "http://chat.local/hook")]).is_err());
        assert!(load(&[
            ("SLACK_URL", "http://chat.local/hook"),
            ("WEBHOOK_SECRET", "too-short")
        ])
        .is_err());
        assert!(load(&[
            ("SLACK_URL", "http://chat.local/hook"),
            ("WEBHOOK_SECRET", STRONG),
            ("WEBHOOK_SECRET_PREVIOUS", "too-short")
        ])
        .is_err());
        assert!(load(&[
            ("SLACK_URL", "http://chat.local/hook"),
            ("SECRET_NAMESPACE", "relay")
        ])
        .is_err());
    }

    #[test]
    fn test_conflicting_secret_sources_are_refused() {
        assert!(load(&[
            ("SLACK_URL", "http://chat.local/hook"),
            ("WEBHOOK_SECRET", STRONG),
            ("SECRET_NAMESPACE", "relay"),
            ("SECRET_NAME", "keys"),
        ])
        .is_err());
    }

    #[test]
    fn test_invalid_values_are_refused() {
        let base = [("WEBHOOK_SECRET", STRONG)];

        assert!(load(&base).is_err());
        assert!(load(&[base[0], ("SLACK_URL", "chat.local/hook")]).is_err());
        assert!(load(&[base[0], ("SLACK_URL", "http://c/h"), ("PORT", "http")]).is_err());
        assert!(load(&[base[0], ("SLACK_URL", "http://c/h"), ("KEY_DERIVATION", "md5")]).is_err());
        assert!(load(&[base[0], ("SLACK_URL", "http://c/h"), ("CONFLICT_RETRY_ATTEMPTS", "0")]).is_err());
    }

    #[test]
    fn test_unparsable_retry_settings_are_refused() {
        let base = [("SLACK_URL", "http://c/h"), ("WEBHOOK_SECRET", STRONG)];

        let err = load(&[base[0], base[1], ("CONFLICT_RETRY_ATTEMPTS", "abc")]).unwrap_err();
        assert!(err.to_string().contains("CONFLICT_RETRY_ATTEMPTS"));

        let err = load(&[base[0], base[1], ("CONFLICT_RETRY_BACKOFF_MS", "-5")]).unwrap_err();
        assert!(err.to_string().contains("CONFLICT_RETRY_BACKOFF_MS"));
    }

    #[test]
    fn test_debug_redacts_inline_secret() {
        let config = load(&[
            ("SLACK_URL", "http://chat.local/hook"),
            ("WEBHOOK_SECRET", STRONG),
        ])
        .unwrap();
        assert!(!format!("{:?}", config).contains(STRONG));
    }
}
