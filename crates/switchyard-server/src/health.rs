use axum::response::IntoResponse;
use http::StatusCode;

/// Liveness of the broker process itself
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
