//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (intentionally unauthenticated for probes)
        .route("/health", get(handlers::health_check))
        // Liveness greetings
        .route("/v1/gaen", get(handlers::hello_v1))
        .route("/v2/gaen", get(handlers::hello_v2))
        .route("/v2UMA/gaen", get(handlers::hello_v2_uma))
        // V1: upload plus delayed next-day key, bucket-addressed download
        .route(
            "/v1/gaen/exposed",
            axum::routing::post(handlers::upload::exposed_v1),
        )
        .route(
            "/v1/gaen/exposednextday",
            axum::routing::post(handlers::upload::exposed_next_day),
        )
        .route(
            "/v1/gaen/exposed/{batch_release_time}",
            get(handlers::download::exposed_v1),
        )
        // V2: tag-incremental download of the protobuf export
        .route(
            "/v2/gaen/exposed",
            get(handlers::download::exposed_v2).post(handlers::upload::exposed_v2),
        )
        // V2-UMA: same contract with the Cuckoo-filter artifact
        .route(
            "/v2UMA/gaen/exposed",
            get(handlers::download::exposed_v2_uma).post(handlers::upload::exposed_v2),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
