// crates/core/src/engine.rs
//! Seams between the job pipeline and the external collaborators.

use async_trait::async_trait;

use crate::error::{AnalysisError, FetchError, LanguageError};
use crate::progress::Progress;
use crate::repo::RepoUrl;

/// Source-control host: materializes working copies and reports languages.
///
/// Implementations include:
/// - `GitFetcher` - `git` CLI plus the GitLab REST API
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Clone or update the working copy of `repo` at `branch`.
    /// Returns the project identifier on success.
    async fn fetch(&self, repo: &RepoUrl, branch: &str) -> Result<String, FetchError>;

    /// Dominant supported language of `repo`.
    async fn detect_language(&self, repo: &RepoUrl) -> Result<String, LanguageError>;
}

/// Static-analysis tool operating on per-project databases.
///
/// Implementations include:
/// - `CodeqlClient` - spawns the `codeql` CLI
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Create (or overwrite) the analysis database for `project`.
    async fn build(&self, project: &str, language: &str) -> Result<(), AnalysisError>;

    /// Analyze the existing database for `project`, reporting progress for
    /// every recognised output line. Returns only after all output has been
    /// consumed and the tool has exited.
    async fn analyze(
        &self,
        project: &str,
        on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<(), AnalysisError>;
}
