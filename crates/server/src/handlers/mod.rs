//! HTTP handlers.

pub mod download;
pub mod upload;

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use lantern_store::KeyStore;

/// Health check (intentionally unauthenticated for load balancers and
/// probes).
pub async fn health_check(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.store.health_check().await?;
    Ok((StatusCode::OK, "ok"))
}

/// GET /v1/gaen - liveness greeting.
pub async fn hello_v1() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("x-hello", "lantern")],
        "Hello from Lantern WS GAEN V1",
    )
}

/// GET /v2/gaen - liveness greeting.
pub async fn hello_v2() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("x-hello", "lantern")],
        "Hello from Lantern WS GAEN V2",
    )
}

/// GET /v2UMA/gaen - liveness greeting.
pub async fn hello_v2_uma() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("x-hello", "lantern")],
        "Hello from Lantern WS GAEN V2-UMA",
    )
}
