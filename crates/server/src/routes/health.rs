// crates/server/src/routes/health.rs
//! Liveness probe for load balancers and deploy scripts.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// Pipelines admitted and not yet terminal.
    pub jobs_in_flight: usize,
}

impl HealthResponse {
    fn from_state(state: &AppState) -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: state.uptime_secs(),
            jobs_in_flight: state.jobs.in_flight(),
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse::from_state(&state))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
