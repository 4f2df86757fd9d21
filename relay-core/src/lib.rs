//! Relay Core
//!
//! Core types and pure logic for the deployment relay.
//!
//! This crate contains:
//! - Signatures: HMAC signing and constant-time verification of webhook bodies
//! - Keys: the key ring used during secret rotation and per-repository key derivation
//! - Payload: decoding of build notifications into a deployment target
//! - Labels: the cluster label convention that marks workloads as deploy candidates
//! - DTOs: the JSON reply sent to webhook callers
//!
//! Nothing in here performs I/O; the server and the CLI share it.

pub mod dto;
pub mod keys;
pub mod label;
pub mod payload;
pub mod signature;

pub use dto::Acknowledgment;
pub use keys::{KeyDerivation, KeyError, KeyRing, MIN_KEY_LEN};
pub use label::{DEFAULT_LABEL_PREFIX, LabelError, LabelTarget, decode_label_value, label_key_for};
pub use payload::{DecodeError, Notification, Target};
pub use signature::{Algorithm, SignatureError, sign, verify};
