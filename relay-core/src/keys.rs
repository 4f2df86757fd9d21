//! Signing keys
//!
//! A [`KeyRing`] holds the master keys accepted during a rotation window,
//! newest first. Senders sign with a key derived from the master key and the
//! repository name, so a key leaked for one repository cannot sign for another.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::signature::{self, Algorithm, SignatureError};

/// Minimum accepted length of a master key, in bytes
pub const MIN_KEY_LEN: usize = 32;

/// Errors raised when building a key ring
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("No signing key configured")]
    Empty,

    #[error("Signing key #{index} is {len} bytes long, at least {min} are required")]
    TooShort { index: usize, len: usize, min: usize },

    #[error("Unknown key derivation '{0}' (expected 'per-repository' or 'direct')")]
    UnknownDerivation(String),
}

/// How the per-request signing key is obtained from a master key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyDerivation {
    /// HMAC-SHA1 of the repository name under the master key
    #[default]
    PerRepository,
    /// The master key signs directly
    Direct,
}

impl FromStr for KeyDerivation {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-repository" | "repository" => Ok(KeyDerivation::PerRepository),
            "direct" => Ok(KeyDerivation::Direct),
            other => Err(KeyError::UnknownDerivation(other.to_string())),
        }
    }
}

/// Derives the signing key for `repository` from a master key
pub fn derive_repository_key(master: &[u8], repository: &str) -> Result<Vec<u8>, SignatureError> {
    signature::mac(Algorithm::Sha1, master, repository.as_bytes())
}

/// Ordered set of acceptable master keys, newest first
#[derive(Clone)]
pub struct KeyRing {
    keys: Vec<Vec<u8>>,
}

impl KeyRing {
    /// Creates a key ring, rejecting empty rings and short keys
    pub fn new(keys: Vec<Vec<u8>>) -> Result<Self, KeyError> {
        if keys.is_empty() {
            return Err(KeyError::Empty);
        }

        for (index, key) in keys.iter().enumerate() {
            if key.len() < MIN_KEY_LEN {
                return Err(KeyError::TooShort {
                    index,
                    len: key.len(),
                    min: MIN_KEY_LEN,
                });
            }
        }

        Ok(Self { keys })
    }

    /// Creates a key ring from a current key and an optional previous key
    ///
    /// An empty previous key is treated as absent.
    pub fn from_rotation(current: Vec<u8>, previous: Option<Vec<u8>>) -> Result<Self, KeyError> {
        let mut keys = vec![current];
        keys.extend(previous.filter(|key| !key.is_empty()));
        Self::new(keys)
    }

    /// Number of keys in the rotation window
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Newest master key
    pub fn current(&self) -> &[u8] {
        &self.keys[0]
    }

    /// Signing keys to try for a notification about `repository`, newest first
    pub fn candidates(
        &self,
        repository: &str,
        derivation: KeyDerivation,
    ) -> Result<Vec<Vec<u8>>, SignatureError> {
        match derivation {
            KeyDerivation::Direct => Ok(self.keys.clone()),
            KeyDerivation::PerRepository => self
                .keys
                .iter()
                .map(|master| derive_repository_key(master, repository))
                .collect(),
        }
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .finish()
    }
}
