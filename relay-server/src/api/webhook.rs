//! Webhook Handler
//!
//! `POST /` receives a build notification. The body is decoded, its signature
//! checked against the current key ring, and the caller acknowledged. The
//! rollout only starts once the acknowledgment has been written out, and its
//! result is reported through logs and chat notifications, never to the caller.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method, header},
    response::{IntoResponse, Response},
};
use futures::stream;
use relay_core::{Acknowledgment, Algorithm, Notification, Target, verify};
use tokio::sync::oneshot;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::RolloutService;

/// Largest accepted notification body
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// ANY /
/// Receive a build notification
pub async fn receive(State(state): State<AppState>, request: Request) -> ApiResult<Response> {
    let remote = remote_addr(&request);

    if request.method() != Method::POST {
        warn!("{} {} from {}", request.method(), request.uri().path(), remote);
        return Err(ApiError::NotFound);
    }

    info!("{} {} from {}", request.method(), request.uri().path(), remote);

    let target = authenticate(&state, request, &remote).await?;
    let (response, delivered) = acknowledge(&target)?;

    spawn_rollout(state.rollout.clone(), target, delivered);

    Ok(response)
}

/// Reads, decodes and verifies the notification
async fn authenticate(state: &AppState, request: Request, remote: &str) -> ApiResult<Target> {
    let (parts, body) = request.into_parts();

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::InternalError(format!("Could not read request body: {}", e)))?;

    let notification = Notification::decode(&body)?;

    let Some(signature) = provided_signature(&parts.headers) else {
        warn!("Missing signature from host {}", remote);
        return Err(ApiError::Unauthorized("Missing signature".to_string()));
    };

    let ring = state.secrets.key_ring().await.map_err(|e| {
        error!("Could not load signing keys: {}", e);
        ApiError::InternalError("Could not load signing keys".to_string())
    })?;

    let candidates = ring
        .candidates(notification.repository(), state.key_derivation)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    if !verify(&body, signature, &candidates) {
        warn!("Signature verification failed for host {}", remote);
        return Err(ApiError::Unauthorized(
            "hmac signature verification failed".to_string(),
        ));
    }

    Ok(notification.normalize()?)
}

/// Signature header value, preferring SHA-256 over the legacy SHA-1 header
fn provided_signature(headers: &HeaderMap) -> Option<&str> {
    [Algorithm::Sha256, Algorithm::Sha1]
        .into_iter()
        .find_map(|algorithm| headers.get(algorithm.header())?.to_str().ok())
}

fn remote_addr(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Builds the success reply and a receiver that fires once it has been written
fn acknowledge(target: &Target) -> ApiResult<(Response, oneshot::Receiver<()>)> {
    let ack = Acknowledgment::accepted(format!("Successfully parsed {}", target.repository));
    let payload = serde_json::to_vec(&ack)
        .map_err(|e| ApiError::InternalError(format!("Could not encode response: {}", e)))?;

    let (body, delivered) = tracked_body(Bytes::from(payload));
    let response = ([(header::CONTENT_TYPE, "application/json")], body).into_response();

    Ok((response, delivered))
}

enum AckState {
    Pending(Bytes, oneshot::Sender<()>),
    Written(oneshot::Sender<()>),
}

/// Body yielding `payload` once, then signalling completion
///
/// The signal fires when the server polls past the last chunk. If the body is
/// dropped early the sender is dropped with it, which the receiver also sees.
fn tracked_body(payload: Bytes) -> (Body, oneshot::Receiver<()>) {
    let (tx, rx) = oneshot::channel();

    let chunks = stream::unfold(AckState::Pending(payload, tx), |state| async move {
        match state {
            AckState::Pending(payload, tx) => {
                Some((Ok::<_, Infallible>(payload), AckState::Written(tx)))
            }
            AckState::Written(tx) => {
                let _ = tx.send(());
                None
            }
        }
    });

    (Body::from_stream(chunks), rx)
}

/// Runs the rollout after the acknowledgment has been delivered
fn spawn_rollout(rollout: Arc<RolloutService>, target: Target, delivered: oneshot::Receiver<()>) {
    let span = info_span!(
        "rollout",
        delivery = %Uuid::new_v4(),
        repository = %target.repository,
        branch = %target.branch,
    );

    tokio::spawn(
        async move {
            // An error only means the caller hung up; the rollout proceeds
            let _ = delivered.await;

            info!(
                "Deploying {} to branch {} workloads",
                target.image, target.branch
            );

            if let Err(e) = rollout.apply(&target).await {
                error!("Rollout aborted: {}", e);
            }
        }
        .instrument(span),
    );
}
