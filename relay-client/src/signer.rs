//! Payload signing
//!
//! Signs notification bodies the way the relay verifies them: with the
//! repository key derived from a master key, or with the master key directly.

use relay_core::keys::derive_repository_key;
use relay_core::{Algorithm, KeyDerivation, Notification, sign};

use crate::error::Result;

/// Signs notification bodies with a master key
#[derive(Clone)]
pub struct Signer {
    master_key: Vec<u8>,
    derivation: KeyDerivation,
}

impl Signer {
    pub fn new(master_key: impl Into<Vec<u8>>, derivation: KeyDerivation) -> Self {
        Self {
            master_key: master_key.into(),
            derivation,
        }
    }

    /// Signs `body`, returning the `sha256=` header value
    ///
    /// The body must be a notification the relay can decode, since the
    /// repository it names selects the derived key.
    pub fn sign(&self, body: &[u8]) -> Result<String> {
        let key = match self.derivation {
            KeyDerivation::Direct => self.master_key.clone(),
            KeyDerivation::PerRepository => {
                let notification = Notification::decode(body)?;
                derive_repository_key(&self.master_key, notification.repository())?
            }
        };

        Ok(sign(Algorithm::Sha256, &key, body)?)
    }
}
