use axum::http::StatusCode;

/// Liveness probe for load balancers.
pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
