// crates/server/src/test_support.rs
//! Shared fixtures for the router tests.

use std::sync::Arc;

use async_trait::async_trait;
use codescan_core::{
    AnalysisEngine, AnalysisError, Config, FetchError, LanguageError, Progress, RepoUrl, SourceHost,
};
use codescan_db::MemoryTaskSink;

use crate::state::AppState;

pub const TOKEN: &str = "test-token";

pub fn test_config() -> Config {
    serde_yaml::from_str(&format!(
        r#"
server:
  listen_on: "127.0.0.1:0"
  token: "{TOKEN}"
gitlab:
  token: "glpat-test"
storage:
  repo_path: "/tmp/codescan-test/repos"
  db_path: "/tmp/codescan-test/dbs"
supported_languages: [java]
"#
    ))
    .expect("valid test config")
}

/// Succeeds at everything instantly.
pub struct NoopSource;

#[async_trait]
impl SourceHost for NoopSource {
    async fn fetch(&self, repo: &RepoUrl, _branch: &str) -> Result<String, FetchError> {
        Ok(repo.project().to_string())
    }

    async fn detect_language(&self, _repo: &RepoUrl) -> Result<String, LanguageError> {
        Ok("java".to_string())
    }
}

pub struct NoopEngine;

#[async_trait]
impl AnalysisEngine for NoopEngine {
    async fn build(&self, _project: &str, _language: &str) -> Result<(), AnalysisError> {
        Ok(())
    }

    async fn analyze(
        &self,
        _project: &str,
        _on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<(), AnalysisError> {
        Ok(())
    }
}

pub fn test_state() -> Arc<AppState> {
    AppState::new(
        test_config(),
        Arc::new(NoopSource),
        Arc::new(NoopEngine),
        Arc::new(MemoryTaskSink::new()),
    )
}
