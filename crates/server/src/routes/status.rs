// crates/server/src/routes/status.rs
//! Job status endpoints.
//!
//! - GET /status?repo=<url> - current status of one in-flight job
//! - GET /jobs - all in-flight jobs
//! - GET /jobs/stream - SSE stream of every status change

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{rejection::QueryRejection, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use codescan_core::RepoUrl;
use codescan_server_jobs::{JobEvent, JobSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub repo: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: JobSnapshot,
}

/// GET /api/status - look up the job for the project named by `repo`.
async fn job_status(
    State(state): State<Arc<AppState>>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Query(query) = query?;
    let repo = RepoUrl::parse(&query.repo)?;
    state
        .jobs
        .get(repo.project())
        .map(|status| Json(StatusResponse { status }))
        .ok_or_else(|| ApiError::JobNotFound(repo.project().to_string()))
}

/// GET /api/jobs - list in-flight jobs.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobEvent>> {
    Json(state.jobs.active())
}

/// GET /api/jobs/stream - SSE stream of status changes.
async fn stream_jobs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.jobs.subscribe();

    let stream = async_stream::stream! {
        let mut rx = rx;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event("job").data(json));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "job stream subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(job_status))
        .route("/jobs", get(list_jobs))
        .route("/jobs/stream", get(stream_jobs))
}
