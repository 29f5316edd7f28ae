// crates/server/src/lib.rs
//! codescan server library.
//!
//! Axum HTTP layer over the job pipeline: submission endpoints, status
//! queries, and the static file mounts for reports and databases.

pub mod auth;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod routes;
pub mod state;

#[cfg(test)]
mod test_support;

pub use error::*;
pub use metrics::{init_metrics, render_metrics};
pub use pipeline::{JobKind, JobOutcome, JobRequest, Pipeline};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// URL prefix under which the analysis databases are served.
pub const DATABASES_MOUNT: &str = "/codeql_dbs";

/// Create the Axum application with all routes and middleware.
///
/// - `/api/*` behind the token check
/// - `/static/codeql_dbs` serving the database root, unauthenticated
/// - `/static` serving `server.static_dir` when configured
/// - request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let db_root = state.config.storage.db_path.clone();
    let mut statics = Router::new().nest_service(DATABASES_MOUNT, ServeDir::new(db_root));
    if let Some(dir) = &state.config.server.static_dir {
        statics = statics.fallback_service(ServeDir::new(dir));
    }

    Router::new()
        .merge(api_routes(state))
        .nest("/static", statics)
        .layer(TraceLayer::new_for_http())
}
