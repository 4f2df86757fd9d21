//! Relay Server
//!
//! Receives build notifications over HTTP, authenticates them, and rolls the
//! built image out to the labelled workloads of the cluster.
//!
//! Architecture:
//! - Configuration: environment variables, validated before listening
//! - API: the webhook endpoint and its early acknowledgment
//! - Services: target resolution and the optimistic image update
//! - Adapters: Kubernetes control plane, key material, chat notifications

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod cluster;
pub mod config;
pub mod notifier;
pub mod secrets;
pub mod service;

#[cfg(test)]
mod testing;

use crate::api::AppState;
use crate::cluster::KubeControlPlane;
use crate::config::{Config, SecretSource};
use crate::notifier::SlackNotifier;
use crate::secrets::{KubeSecretStore, SecretStore, StaticSecretStore};
use crate::service::RolloutService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Relay Server...");

    let config = Config::from_env().context("Invalid configuration")?;

    info!("Connecting to the cluster control plane...");

    let control_plane = KubeControlPlane::connect()
        .await
        .context("Failed to create cluster client")?;
    let version = control_plane
        .server_version()
        .await
        .context("Cluster control plane is unreachable")?;

    info!("Connected to control plane {}", version);

    let secrets = secret_store(&config, &control_plane).await?;

    let rollout = RolloutService::new(
        Arc::new(control_plane),
        Arc::new(SlackNotifier::new(config.slack_url.clone())),
        config.label_prefix.clone(),
        config.retry,
    );

    let app = api::create_router(AppState {
        secrets,
        rollout: Arc::new(rollout),
        key_derivation: config.key_derivation,
    });

    info!("Server listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

/// Builds the key store and checks that it yields a usable key ring
async fn secret_store(
    config: &Config,
    control_plane: &KubeControlPlane,
) -> Result<Arc<dyn SecretStore>> {
    let store: Arc<dyn SecretStore> = match &config.secret_source {
        SecretSource::Inline { current, previous } => {
            let ring = relay_core::KeyRing::from_rotation(current.clone(), previous.clone())
                .context("Invalid WEBHOOK_SECRET")?;
            Arc::new(StaticSecretStore::new(ring))
        }
        SecretSource::Cluster { namespace, name } => Arc::new(KubeSecretStore::new(
            control_plane.client().clone(),
            namespace.clone(),
            name.clone(),
        )),
    };

    let ring = store
        .key_ring()
        .await
        .context("Could not load webhook signing keys")?;

    info!(
        "Loaded {} signing key(s), derivation: {:?}",
        ring.len(),
        config.key_derivation
    );

    Ok(store)
}
