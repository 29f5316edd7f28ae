// crates/server/src/state.rs
//! Application context shared by every route handler and pipeline.

use std::sync::Arc;
use std::time::Instant;

use codescan_core::{AnalysisEngine, CodeqlClient, Config, GitFetcher, SourceHost};
use codescan_db::TaskSink;
use codescan_server_jobs::StatusTable;

use crate::pipeline::Pipeline;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Configuration loaded at startup; read-only.
    pub config: Arc<Config>,
    /// Live status of in-flight jobs.
    pub jobs: Arc<StatusTable>,
    /// Stage sequencing over the collaborators below.
    pub pipeline: Pipeline,
}

impl AppState {
    /// Wire explicit collaborators (used by tests with fakes).
    pub fn new(
        config: Config,
        source: Arc<dyn SourceHost>,
        engine: Arc<dyn AnalysisEngine>,
        sink: Arc<dyn TaskSink>,
    ) -> Arc<Self> {
        let jobs = Arc::new(StatusTable::new());
        let pipeline = Pipeline::new(Arc::clone(&jobs), source, engine, sink);
        Arc::new(Self {
            start_time: Instant::now(),
            config: Arc::new(config),
            jobs,
            pipeline,
        })
    }

    /// Production wiring: `git` + GitLab API and the `codeql` CLI.
    pub fn from_config(config: Config, sink: Arc<dyn TaskSink>) -> Arc<Self> {
        let source = Arc::new(GitFetcher::from_config(&config));
        let engine = Arc::new(CodeqlClient::from_config(&config));
        Self::new(config, source, engine, sink)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
