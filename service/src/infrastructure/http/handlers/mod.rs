use axum::http::StatusCode;

pub mod posts;
pub mod requests;

// health check handler
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}
