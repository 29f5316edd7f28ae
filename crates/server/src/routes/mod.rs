//! API route handlers for the codescan server.

pub mod health;
pub mod jobs;
pub mod metrics;
pub mod status;

use std::sync::Arc;

use axum::{http::StatusCode, middleware, Json, Router};

use crate::auth::require_token;
use crate::error::ErrorResponse;
use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes (all require the `Authorization` token):
/// - POST /api/scan - Fetch, detect language, build and analyze
/// - POST /api/build - Build the analysis database
/// - POST /api/analyze - Analyze an existing database
/// - POST /api/clone - Fetch the working copy
/// - GET  /api/status?repo= - Status of one in-flight job
/// - GET  /api/jobs - All in-flight jobs
/// - GET  /api/jobs/stream - SSE stream of status changes
/// - GET  /api/health - Health check
/// - GET  /api/metrics - Prometheus metrics
///
/// The token check also covers unknown `/api` paths, which answer 404 only
/// once authenticated.
pub fn api_routes(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(jobs::router())
        .merge(status::router())
        .merge(health::router())
        .merge(metrics::router())
        .fallback(unknown_route)
        .layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new().nest("/api", api).with_state(state)
}

async fn unknown_route() -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not found")))
}
