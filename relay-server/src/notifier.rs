//! Chat notifications
//!
//! Posts plain-text messages to a Slack-compatible incoming webhook.
//! Delivery is best effort: failures are logged and never returned.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Sink for deployment notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `text`; never fails
    async fn notify(&self, text: &str);
}

/// Errors raised while delivering a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Webhook rejected the message (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Request timeout of the default client
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

/// Incoming-webhook notifier
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to a default HTTP client: {}", e);
                Client::new()
            });
        Self::with_client(url, client)
    }

    /// Creates a notifier with a custom HTTP client (timeouts, proxies)
    pub fn with_client(url: impl Into<String>, client: Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    /// Posts `text`, reporting delivery failures
    pub async fn post(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, text: &str) {
        match self.post(text).await {
            Ok(()) => debug!("Chat notification delivered"),
            Err(e) => warn!("Couldn't deliver chat notification: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::Value as JsonValue;
    use tokio::sync::mpsc;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/hook", addr)
    }

    #[tokio::test]
    async fn test_posts_text_payload() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/hook",
            post(move |Json(body): Json<JsonValue>| {
                let tx = tx.clone();
                async move {
                    tx.send(body).unwrap();
                    StatusCode::OK
                }
            }),
        );
        let url = serve(app).await;

        SlackNotifier::new(url).post("deployed").await.unwrap();

        let body = rx.recv().await.unwrap();
        assert_eq!(body, serde_json::json!({ "text": "deployed" }));
    }

    #[tokio::test]
    async fn test_rejection_is_reported_by_post() {
        let app = Router::new().route(
            "/hook",
            post(|| async { (StatusCode::FORBIDDEN, "invalid_token") }),
        );
        let url = serve(app).await;

        let err = SlackNotifier::new(url).post("deployed").await.unwrap_err();
        assert!(matches!(
            err,
            NotifyError::Rejected { status: 403, ref message } if message == "invalid_token"
        ));
    }

    #[tokio::test]
    async fn test_notify_swallows_delivery_failure() {
        // Nothing listens on the discard port
        let notifier = SlackNotifier::new("http://127.0.0.1:9/hook");
        notifier.notify("deployed").await;
    }

    #[tokio::test]
    async fn test_unresponsive_webhook_times_out() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let notifier = SlackNotifier::with_client(format!("http://{}/hook", addr), client);

        let result = tokio::time::timeout(Duration::from_secs(10), notifier.post("deployed"))
            .await
            .expect("post did not time out");
        assert!(matches!(result, Err(NotifyError::RequestFailed(ref e)) if e.is_timeout()));
    }
}
