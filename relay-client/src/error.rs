//! Error types for the relay client

use relay_core::{DecodeError, SignatureError};
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the relay client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Relay answered with an error status
    #[error("Relay rejected the notification (status {status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Message from the relay
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Payload could not be decoded locally
    #[error(transparent)]
    InvalidPayload(#[from] DecodeError),

    /// Payload could not be signed
    #[error(transparent)]
    Signing(#[from] SignatureError),
}

impl ClientError {
    /// Create a rejection from status code and message
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Check if the relay refused the signature
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Rejected { status: 401, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Rejected { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Rejected { status, .. } if *status >= 500)
    }
}
