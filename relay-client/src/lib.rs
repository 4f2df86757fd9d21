//! Relay HTTP Client
//!
//! A small, type-safe client for delivering signed build notifications to a
//! running relay, used by the CLI and by build steps that notify directly.
//!
//! # Example
//!
//! ```no_run
//! use relay_client::{RelayClient, Signer};
//! use relay_core::KeyDerivation;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RelayClient::new("http://localhost:8080");
//!     let signer = Signer::new(std::env::var("RELAY_MASTER_KEY")?, KeyDerivation::PerRepository);
//!
//!     let body = std::fs::read("notification.json")?;
//!     let ack = client.send_signed(body, &signer).await?;
//!
//!     println!("{}", ack.message);
//!     Ok(())
//! }
//! ```

pub mod error;
mod signer;

pub use error::{ClientError, Result};
pub use relay_core::Acknowledgment;
pub use signer::Signer;

use relay_core::Algorithm;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

/// HTTP client for the relay webhook endpoint
#[derive(Debug, Clone)]
pub struct RelayClient {
    /// Base URL of the relay (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl RelayClient {
    /// Create a new relay client
    ///
    /// # Example
    /// ```
    /// use relay_client::RelayClient;
    ///
    /// let client = RelayClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new relay client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the relay
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Deliver a body with a precomputed signature
    ///
    /// The header is chosen from the signature prefix (`sha1=` or `sha256=`).
    pub async fn send(&self, body: Vec<u8>, signature: &str) -> Result<Acknowledgment> {
        let header = Algorithm::detect(signature)
            .unwrap_or(Algorithm::Sha256)
            .header();
        let url = format!("{}/", self.base_url);

        tracing::debug!("Sending {} byte notification to {}", body.len(), url);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(header, signature)
            .body(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Sign a body and deliver it
    pub async fn send_signed(&self, body: Vec<u8>, signer: &Signer) -> Result<Acknowledgment> {
        let signature = signer.sign(&body)?;
        self.send(body, &signature).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Turn the relay's reply into an acknowledgment or a rejection
    ///
    /// Error replies carry the same JSON body; plain text is tolerated.
    async fn handle_response(&self, response: reqwest::Response) -> Result<Acknowledgment> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Acknowledgment>(&text)
                .map(|ack| ack.message)
                .unwrap_or(text);
            return Err(ClientError::rejected(status.as_u16(), message));
        }

        serde_json::from_str(&text)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}
