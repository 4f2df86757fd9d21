//! Webhook signatures
//!
//! Signatures travel as `<algorithm>=<hex digest>` in either the
//! `X-Hub-Signature` (HMAC-SHA1) or `X-Hub-Signature-256` (HMAC-SHA256) header.
//! Verification compares against every candidate key in constant time.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};
use thiserror::Error;

/// Header carrying the legacy `sha1=` signature
pub const SHA1_HEADER: &str = "x-hub-signature";

/// Header carrying the `sha256=` signature
pub const SHA256_HEADER: &str = "x-hub-signature-256";

/// Errors raised while computing a signature
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The MAC implementation refused the key
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
}

/// MAC algorithm of a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha1,
    Sha256,
}

impl Algorithm {
    /// Prefix written in front of the hex digest
    pub fn prefix(self) -> &'static str {
        match self {
            Algorithm::Sha1 => "sha1=",
            Algorithm::Sha256 => "sha256=",
        }
    }

    /// Request header that carries signatures of this algorithm
    pub fn header(self) -> &'static str {
        match self {
            Algorithm::Sha1 => SHA1_HEADER,
            Algorithm::Sha256 => SHA256_HEADER,
        }
    }

    /// Selects the algorithm from the prefix of a provided signature
    pub fn detect(signature: &str) -> Option<Self> {
        if signature.starts_with(Algorithm::Sha256.prefix()) {
            Some(Algorithm::Sha256)
        } else if signature.starts_with(Algorithm::Sha1.prefix()) {
            Some(Algorithm::Sha1)
        } else {
            None
        }
    }
}

/// Computes the raw HMAC of `message` under `key`
pub fn mac(algorithm: Algorithm, key: &[u8], message: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let digest = match algorithm {
        Algorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key)
                .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key)
                .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
    };

    Ok(digest)
}

/// Signs `body` with `key`, producing the prefixed hex form sent in headers
///
/// # Example
/// ```
/// use relay_core::{Algorithm, sign};
///
/// let signature = sign(Algorithm::Sha256, b"key", b"{}").unwrap();
/// assert!(signature.starts_with("sha256="));
/// ```
pub fn sign(algorithm: Algorithm, key: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    let digest = mac(algorithm, key, body)?;
    Ok(format!("{}{}", algorithm.prefix(), hex::encode(digest)))
}

/// Checks `provided` against the signature of `body` under every candidate key
///
/// All candidates are evaluated even after a match, and each comparison runs
/// in time that depends only on the expected signature length.
pub fn verify<K: AsRef<[u8]>>(body: &[u8], provided: &str, candidates: &[K]) -> bool {
    let Some(algorithm) = Algorithm::detect(provided) else {
        return false;
    };

    let mut matched = Choice::from(0);
    for key in candidates {
        let Ok(expected) = sign(algorithm, key.as_ref(), body) else {
            continue;
        };
        matched |= constant_time_eq(expected.as_bytes(), provided.as_bytes());
    }

    matched.into()
}

/// Byte comparison that walks all of `expected` regardless of content.
///
/// A length mismatch still walks the full expected length before failing.
fn constant_time_eq(expected: &[u8], provided: &[u8]) -> Choice {
    let same_len = (expected.len() as u64).ct_eq(&(provided.len() as u64));

    let mut equal = Choice::from(1);
    for (i, byte) in expected.iter().enumerate() {
        let other = provided.get(i).copied().unwrap_or(!*byte);
        equal &= byte.ct_eq(&other);
    }

    equal & same_len
}
