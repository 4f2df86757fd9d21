//! Signing key material
//!
//! Keys come either from the process environment or from a cluster Secret
//! holding `master_key` and, during rotation, `master_key_old`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::Client;
use kube::api::Api;
use relay_core::{KeyError, KeyRing};
use thiserror::Error;

/// Secret entry holding the current master key
pub const MASTER_KEY: &str = "master_key";

/// Secret entry holding the previous master key
pub const PREVIOUS_MASTER_KEY: &str = "master_key_old";

/// Errors raised while loading key material
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Could not read secret {namespace}/{name}: {source}")]
    Request {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Secret {0} has no 'master_key' entry")]
    MissingKey(String),

    #[error("Secret {secret} holds unusable key material: {source}")]
    Invalid {
        secret: String,
        #[source]
        source: KeyError,
    },
}

/// Source of the key ring used to verify notifications
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn key_ring(&self) -> Result<KeyRing, SecretError>;
}

/// Key ring fixed at startup
#[derive(Debug, Clone)]
pub struct StaticSecretStore {
    ring: KeyRing,
}

impl StaticSecretStore {
    pub fn new(ring: KeyRing) -> Self {
        Self { ring }
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn key_ring(&self) -> Result<KeyRing, SecretError> {
        Ok(self.ring.clone())
    }
}

/// Key ring read from a cluster Secret on every call, so rotations apply immediately
#[derive(Clone)]
pub struct KubeSecretStore {
    api: Api<Secret>,
    namespace: String,
    name: String,
}

impl KubeSecretStore {
    pub fn new(client: Client, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            namespace,
            name: name.into(),
        }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn key_ring(&self) -> Result<KeyRing, SecretError> {
        let secret = self
            .api
            .get(&self.name)
            .await
            .map_err(|source| SecretError::Request {
                namespace: self.namespace.clone(),
                name: self.name.clone(),
                source,
            })?;

        let data = secret.data.unwrap_or_default();
        key_ring_from_data(&format!("{}/{}", self.namespace, self.name), &data)
    }
}

/// Builds a key ring from the entries of a Secret
fn key_ring_from_data(
    secret: &str,
    data: &BTreeMap<String, ByteString>,
) -> Result<KeyRing, SecretError> {
    let current = data
        .get(MASTER_KEY)
        .map(|value| value.0.clone())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SecretError::MissingKey(secret.to_string()))?;
    let previous = data.get(PREVIOUS_MASTER_KEY).map(|value| value.0.clone());

    KeyRing::from_rotation(current, previous).map_err(|source| SecretError::Invalid {
        secret: secret.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::MIN_KEY_LEN;

    fn data(entries: &[(&str, Vec<u8>)]) -> BTreeMap<String, ByteString> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.clone())))
            .collect()
    }

    #[test]
    fn test_reads_current_and_previous_keys() {
        let ring = key_ring_from_data(
            "relay/keys",
            &data(&[
                (MASTER_KEY, vec![1; MIN_KEY_LEN]),
                (PREVIOUS_MASTER_KEY, vec![2; MIN_KEY_LEN]),
            ]),
        )
        .unwrap();

        assert_eq!(ring.len(), 2);
        assert_eq!(ring.current(), vec![1; MIN_KEY_LEN].as_slice());
    }

    #[test]
    fn test_previous_key_is_optional() {
        let ring =
            key_ring_from_data("relay/keys", &data(&[(MASTER_KEY, vec![1; MIN_KEY_LEN])])).unwrap();
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_missing_or_short_key_is_rejected() {
        let err = key_ring_from_data("relay/keys", &data(&[])).unwrap_err();
        assert!(matches!(err, SecretError::MissingKey(ref s) if s == "relay/keys"));

        let err =
            key_ring_from_data("relay/keys", &data(&[(MASTER_KEY, b"short".to_vec())])).unwrap_err();
        assert!(matches!(
            err,
            SecretError::Invalid {
                source: KeyError::TooShort { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_static_store_returns_ring() {
        let ring = KeyRing::from_rotation(vec![3; MIN_KEY_LEN], None).unwrap();
        let store = StaticSecretStore::new(ring);
        assert_eq!(store.key_ring().await.unwrap().len(), 1);
    }
}
