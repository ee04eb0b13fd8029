//! HTTP surface for billing provider deliveries

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use chitin_core::HttpError;
use http::{HeaderMap, StatusCode};
use serde::Serialize;

use crate::metrics::WebhookMetrics;
use crate::processor::{Disposition, WebhookProcessor};

/// Shared state for the webhook endpoint
#[derive(Clone)]
pub struct WebhookState {
    processor: Arc<WebhookProcessor>,
    metrics: WebhookMetrics,
}

impl WebhookState {
    pub fn new(processor: WebhookProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
            metrics: WebhookMetrics::new(),
        }
    }
}

/// Success body
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub message: String,
}

/// Router serving the webhook at `path`
pub fn webhook_router(state: WebhookState, path: &str) -> Router {
    Router::new().route(path, post(billing_webhook)).with_state(state)
}

/// Handle one billing provider delivery
///
/// The body is taken as raw bytes so malformed JSON is reported through
/// the same error body as every other rejection.
pub async fn billing_webhook(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> Response {
    let start = Instant::now();

    match state.processor.handle(&headers, &body).await {
        Ok(outcome) => {
            if let Disposition::Granted { tokens, product_id } = &outcome.disposition {
                state.metrics.record_grant(*tokens, product_id.as_deref());
            }
            state
                .metrics
                .record(start, outcome.status(), Some(outcome.event_type.as_str()));

            let body = WebhookResponse {
                status: outcome.status(),
                message: outcome.message(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            state.metrics.record(start, error_outcome(e.error_type()), None);
            (e.status_code(), Json(e.to_body())).into_response()
        }
    }
}

fn error_outcome(error_type: &str) -> &'static str {
    match error_type {
        "authentication_error" => "unauthenticated",
        "invalid_request_error" => "malformed",
        "configuration_error" => "misconfigured",
        _ => "failed",
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::{RecordingStore, TOKEN, payload, processor};

    const PATH: &str = "/webhooks/billing";

    fn router(store: Arc<RecordingStore>) -> Router {
        webhook_router(WebhookState::new(processor(store)), PATH)
    }

    async fn send(router: Router, authorization: Option<&str>, body: Vec<u8>) -> (StatusCode, Value) {
        let mut request = Request::post(PATH).header("content-type", "application/json");
        if let Some(value) = authorization {
            request = request.header("authorization", value);
        }

        let response = router.oneshot(request.body(Body::from(body)).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn authorization() -> String {
        format!("Bearer {TOKEN}")
    }

    #[tokio::test]
    async fn processed_then_already_processed() {
        let store = Arc::new(RecordingStore::default());
        let body = payload("evt_1", "INITIAL_PURCHASE", "user_1", Some("weekly"));

        let (status, json) = send(router(store.clone()), Some(&authorization()), body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "processed");
        assert_eq!(json["message"], "granted 200 tokens");

        let (status, json) = send(router(store.clone()), Some(&authorization()), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "already_processed");
    }

    #[tokio::test]
    async fn unauthorized_body() {
        let store = Arc::new(RecordingStore::default());
        let body = payload("evt_1", "RENEWAL", "user_1", Some("weekly"));

        let (status, json) = send(router(store.clone()), Some("Bearer nope"), body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["type"], "authentication_error");
        assert_eq!(json["error"]["message"], "unauthorized");
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_json_is_bad_request() {
        let store = Arc::new(RecordingStore::default());

        let (status, json) = send(router(store), Some(&authorization()), b"{not json".to_vec()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn persistence_failure_is_server_error() {
        let store = Arc::new(RecordingStore::default());
        store.set_fail_apply(true);

        let body = payload("evt_1", "CANCELLATION", "user_1", None);
        let (status, json) = send(router(store), Some(&authorization()), body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["type"], "persistence_error");
        assert_eq!(json["error"]["message"], "an internal error occurred");
    }

    #[tokio::test]
    async fn only_post_is_routed() {
        let store = Arc::new(RecordingStore::default());
        let response = router(store)
            .oneshot(Request::get(PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
