// crates/core/src/fetcher.rs
//! Repository fetcher backed by the `git` CLI and the GitLab REST API.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::engine::SourceHost;
use crate::error::{FetchError, LanguageError};
use crate::process::{CommandSpec, ProcessRunner};
use crate::repo::RepoUrl;

/// Timeout for a single call to the hosting API.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Clones/updates working copies under a storage root and queries GitLab
/// for project languages.
pub struct GitFetcher {
    git: PathBuf,
    repo_root: PathBuf,
    token: String,
    api_url: Option<String>,
    supported_languages: Vec<String>,
    runner: ProcessRunner,
    http: reqwest::Client,
}

impl GitFetcher {
    pub fn new(
        git: impl Into<PathBuf>,
        repo_root: impl Into<PathBuf>,
        token: impl Into<String>,
        supported_languages: Vec<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            git: git.into(),
            repo_root: repo_root.into(),
            token: token.into(),
            api_url: None,
            supported_languages,
            runner: ProcessRunner::new(),
            http,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.codeql.git_path,
            &config.storage.repo_path,
            &config.gitlab.token,
            config.supported_languages.clone(),
        )
        .with_api_url(config.gitlab.api_url.clone())
        .with_runner(ProcessRunner::new().with_timeout(config.codeql.timeout()))
    }

    /// Use a fixed API base instead of deriving it from each repository URL.
    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        self.api_url = api_url;
        self
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Local path of the working copy for `project`.
    pub fn working_copy(&self, project: &str) -> PathBuf {
        self.repo_root.join(project)
    }

    fn git(&self) -> CommandSpec {
        CommandSpec::new(&self.git)
            .env("GIT_TERMINAL_PROMPT", "0")
            .secret(self.token.as_str())
    }

    /// Whether `path` is the top level of a git working copy.
    ///
    /// `rev-parse` alone would also succeed for a plain directory nested in
    /// some other checkout, so the reported top level must be `path` itself.
    async fn is_working_copy(&self, path: &Path) -> bool {
        let Ok(expected) = tokio::fs::canonicalize(path).await else {
            return false;
        };
        let probe = self
            .git()
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(path);
        match self.runner.run(&probe).await {
            Ok(toplevel) => match tokio::fs::canonicalize(toplevel.trim()).await {
                Ok(actual) => actual == expected,
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    async fn clone_or_update(&self, repo: &RepoUrl, branch: &str) -> Result<String, FetchError> {
        if branch.is_empty() || branch.starts_with('-') {
            return Err(FetchError::InvalidBranch(branch.to_string()));
        }
        let project = repo.project().to_string();
        let local = self.working_copy(&project);
        let local_str = local.to_string_lossy().into_owned();

        if self.is_working_copy(&local).await {
            tracing::info!(project = %project, branch, "working copy exists, checking out and pulling");
            let sync_err = |source: crate::error::ProcessError| FetchError::Sync {
                project: project.clone(),
                source,
            };
            let checkout = self.git().args(["checkout", branch]).current_dir(&local);
            self.runner.run(&checkout).await.map_err(sync_err)?;
            let pull = self.git().args(["pull", "--ff-only"]).current_dir(&local);
            self.runner.run(&pull).await.map_err(sync_err)?;
            return Ok(project);
        }

        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FetchError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tracing::info!(project = %project, branch, "no working copy, cloning");
        let clone = self.git().args([
            "clone".to_string(),
            "--branch".to_string(),
            branch.to_string(),
            "--single-branch".to_string(),
            "--depth".to_string(),
            "1".to_string(),
            repo.authenticated_clone_url(&self.token),
            local_str,
        ]);
        self.runner
            .run(&clone)
            .await
            .map_err(|source| FetchError::Clone {
                project: project.clone(),
                source,
            })?;
        Ok(project)
    }

    async fn query_languages(&self, repo: &RepoUrl) -> Result<BTreeMap<String, f64>, LanguageError> {
        let base = self.api_url.clone().unwrap_or_else(|| repo.api_base());
        let url = repo.languages_url(&base);
        let api_err = |message: String| LanguageError::Api {
            project: repo.project().to_string(),
            message,
        };

        tracing::debug!(project = %repo.project(), url = %url, "querying project languages");
        let response = self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|e| api_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_err(format!("unexpected status {status}")));
        }
        response
            .json::<BTreeMap<String, f64>>()
            .await
            .map_err(|e| api_err(format!("invalid response body: {e}")))
    }
}

/// Pick the language to analyze from a language → share breakdown.
///
/// Allowed languages are tried in descending share order; comparison with
/// the allow-list ignores ASCII case.
pub fn select_language(languages: &BTreeMap<String, f64>, supported: &[String]) -> Option<String> {
    let mut ranked: Vec<(&String, &f64)> = languages.iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(Ordering::Equal));
    ranked
        .into_iter()
        .find(|(name, _)| supported.iter().any(|s| s.eq_ignore_ascii_case(name)))
        .map(|(name, _)| name.clone())
}

#[async_trait]
impl SourceHost for GitFetcher {
    async fn fetch(&self, repo: &RepoUrl, branch: &str) -> Result<String, FetchError> {
        self.clone_or_update(repo, branch).await
    }

    async fn detect_language(&self, repo: &RepoUrl) -> Result<String, LanguageError> {
        let languages = self.query_languages(repo).await?;
        match select_language(&languages, &self.supported_languages) {
            Some(language) => {
                tracing::info!(project = %repo.project(), language = %language, "detected project language");
                Ok(language)
            }
            None => Err(LanguageError::Unsupported {
                project: repo.project().to_string(),
                languages,
            }),
        }
    }
}
