// crates/server/src/auth.rs
//! Shared-secret check applied to every `/api` route.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Reject requests whose `Authorization` header is not the configured token.
pub async fn require_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if provided.is_empty() {
        return Err(ApiError::Unauthorized("missing token"));
    }
    if provided != state.config.server.token {
        return Err(ApiError::Unauthorized("invalid token"));
    }
    Ok(next.run(request).await)
}
