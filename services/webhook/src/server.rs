//! HTTP surface of the webhook
//!
//! The listener comes up before the Kubernetes client does; until the
//! broker is installed into [`AppState`] every `/vip` call answers 503.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::OnceCell;
use tower_http::trace::TraceLayer;
use tracing::warn;

use kube_lb_common::{AllocationRequest, AllocationResponse, VIP_ROUTE};

use crate::broker::Broker;
use crate::error::BrokerError;

#[derive(Clone, Default)]
pub struct AppState {
    broker: Arc<OnceCell<Arc<Broker>>>,
}

impl AppState {
    /// State with no broker yet.
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn ready(broker: Broker) -> Self {
        let state = Self::default();
        state.install(broker);
        state
    }

    /// Make `broker` available to handlers. Returns `false` if one was already set.
    pub fn install(&self, broker: Broker) -> bool {
        self.broker.set(Arc::new(broker)).is_ok()
    }

    fn broker(&self) -> Result<Arc<Broker>, BrokerError> {
        self.broker.get().cloned().ok_or(BrokerError::NotReady)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route(VIP_ROUTE, post(allocate_vip))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.broker() {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "service": "kube-lb-webhook",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "initializing" })),
        ),
    }
}

/// `POST /vip`. The body is decoded by hand so any malformed payload maps to 400.
async fn allocate_vip(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AllocationResponse>, BrokerError> {
    let broker = state.broker().map_err(|e| {
        warn!("VIP pool not initialized, rejecting request");
        e
    })?;

    let req: AllocationRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Failed to decode request");
        BrokerError::InvalidBody(e.to_string())
    })?;

    match broker.allocate(&req).await {
        Ok(resp) => Ok(Json(resp)),
        Err(e) => {
            warn!(
                cluster_id = %req.cluster_id,
                namespace = %req.namespace,
                service = %req.service_name,
                error = %e,
                "Allocation failed"
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::testing::{request, Hub};
    use axum::body::Body;
    use axum::http::Request;
    use kube_lb_common::ErrorBody;
    use tower::ServiceExt;

    fn post_vip(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/vip")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_vip_success() {
        let hub = Hub::new(Some(3));
        let app = router(AppState::ready(hub.broker()));
        let body = serde_json::to_vec(&request(&["10.0.0.1", "10.0.0.2"])).unwrap();

        let resp = app.oneshot(post_vip(body)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let vip: AllocationResponse = body_json(resp).await;
        assert_eq!(vip.vip, "192.0.2.5");
    }

    #[tokio::test]
    async fn test_vip_not_ready() {
        let app = router(AppState::pending());
        let body = serde_json::to_vec(&request(&["10.0.0.1"])).unwrap();

        let resp = app.oneshot(post_vip(body)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_vip_malformed_body() {
        let hub = Hub::new(Some(1));
        let app = router(AppState::ready(hub.broker()));

        let resp = app.oneshot(post_vip("{not json")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err: ErrorBody = body_json(resp).await;
        assert!(err.error.starts_with("invalid request body"));
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn test_vip_zero_node_port() {
        let hub = Hub::new(Some(1));
        let app = router(AppState::ready(hub.broker()));
        let mut req = request(&["10.0.0.1"]);
        req.node_port = 0;

        let resp = app
            .oneshot(post_vip(serde_json::to_vec(&req).unwrap()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(hub.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_vip_allocator_timeout() {
        let hub = Hub::new(None);
        let app = router(AppState::ready(hub.broker()));
        let body = serde_json::to_vec(&request(&["10.0.0.1"])).unwrap();

        let resp = app.oneshot(post_vip(body)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_healthz_tracks_readiness() {
        let state = AppState::pending();
        let app = router(state.clone());

        let req = || Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        assert!(state.install(Hub::new(None).broker()));
        assert!(!state.install(Hub::new(None).broker()));

        let resp = app.oneshot(req()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
