//! API Module
//!
//! HTTP surface of the relay: a single webhook endpoint at `/`.

pub mod error;
pub mod webhook;

use std::sync::Arc;

use axum::{Router, routing::any};
use relay_core::KeyDerivation;
use tower_http::trace::TraceLayer;

use crate::secrets::SecretStore;
use crate::service::RolloutService;

/// Shared, read-only state of all requests
#[derive(Clone)]
pub struct AppState {
    pub secrets: Arc<dyn SecretStore>,
    pub rollout: Arc<RolloutService>,
    pub key_derivation: KeyDerivation,
}

/// Create the router with the webhook endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Non-POST methods are answered with 404 by the handler itself
        .route("/", any(webhook::receive))
        .fallback(error::not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
