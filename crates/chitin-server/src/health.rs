use axum::response::IntoResponse;
use http::{StatusCode, header};

/// Liveness probe, answered without consulting the store
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, [(header::CACHE_CONTROL, "no-store")], "ok")
}
