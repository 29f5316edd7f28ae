// crates/server/src/routes/jobs.rs
//! Job submission endpoints.
//!
//! - POST /scan - fetch, detect language, build and analyze
//! - POST /build - build the analysis database only
//! - POST /analyze - analyze an existing database only
//! - POST /clone - fetch the working copy only
//!
//! Each handler validates synchronously, starts the pipeline in the
//! background and answers 202 without waiting for it.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use codescan_core::{validate_project, RepoUrl};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::pipeline::JobRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RepoRequest {
    pub repo_url: String,
    pub branch: String,
}

#[derive(Debug, Deserialize)]
pub struct BuildRequest {
    pub project: String,
    pub language: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub project: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct Accepted {
    pub message: String,
}

type Accept = (StatusCode, Json<Accepted>);

fn required<'a>(field: &str, value: &'a str) -> ApiResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    Ok(value)
}

fn parse_repo(body: &RepoRequest) -> ApiResult<(RepoUrl, String)> {
    let repo = RepoUrl::parse(required("repo_url", &body.repo_url)?)?;
    let branch = required("branch", &body.branch)?;
    if branch.starts_with('-') {
        return Err(ApiError::BadRequest(format!("Invalid branch name: {branch}")));
    }
    Ok((repo, branch.to_string()))
}

fn parse_project(project: &str) -> ApiResult<String> {
    let project = required("project", project)?;
    Ok(validate_project(project)?.to_string())
}

fn submit(state: &AppState, request: JobRequest, noun: &str) -> ApiResult<Accept> {
    state
        .pipeline
        .submit(request)
        .map_err(|e| ApiError::Conflict(e.to_string()))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            message: format!("{noun} request accepted, processing in background"),
        }),
    ))
}

/// POST /api/scan
async fn scan(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RepoRequest>, JsonRejection>,
) -> ApiResult<Accept> {
    let Json(body) = payload?;
    let (repo, branch) = parse_repo(&body)?;
    submit(&state, JobRequest::Scan { repo, branch }, "Scan")
}

/// POST /api/build
async fn build(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BuildRequest>, JsonRejection>,
) -> ApiResult<Accept> {
    let Json(body) = payload?;
    let project = parse_project(&body.project)?;
    let language = required("language", &body.language)?;
    if language.starts_with('-') {
        return Err(ApiError::BadRequest(format!("Invalid language: {language}")));
    }
    let request = JobRequest::Build {
        project,
        language: language.to_string(),
    };
    submit(&state, request, "Build")
}

/// POST /api/analyze
async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<Accept> {
    let Json(body) = payload?;
    let project = parse_project(&body.project)?;
    submit(&state, JobRequest::Analyze { project }, "Analyze")
}

/// POST /api/clone
async fn clone_repo(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RepoRequest>, JsonRejection>,
) -> ApiResult<Accept> {
    let Json(body) = payload?;
    let (repo, branch) = parse_repo(&body)?;
    submit(&state, JobRequest::Clone { repo, branch }, "Clone")
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/scan", post(scan))
        .route("/build", post(build))
        .route("/analyze", post(analyze))
        .route("/clone", post(clone_repo))
}
