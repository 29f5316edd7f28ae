// crates/core/src/codeql.rs
//! CodeQL CLI driver: database creation and streaming analysis.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::Config;
use crate::engine::AnalysisEngine;
use crate::error::AnalysisError;
use crate::process::{CommandSpec, ProcessRunner};
use crate::progress::{extract_progress, Progress};

/// Name of the database directory inside a project's database root.
pub const DATABASE_DIR: &str = "codeql_db";
/// Name of the SARIF report written into the working copy.
pub const RESULT_FILE: &str = "codeql_result.sarif";

pub struct CodeqlClient {
    codeql: PathBuf,
    db_root: PathBuf,
    repo_root: PathBuf,
    analyze_args: Vec<String>,
    runner: ProcessRunner,
}

impl CodeqlClient {
    pub fn new(
        codeql: impl Into<PathBuf>,
        db_root: impl Into<PathBuf>,
        repo_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            codeql: codeql.into(),
            db_root: db_root.into(),
            repo_root: repo_root.into(),
            analyze_args: Vec::new(),
            runner: ProcessRunner::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.codeql.codeql_path,
            &config.storage.db_path,
            &config.storage.repo_path,
        )
        .with_analyze_args(config.codeql.analyze_args.clone())
        .with_runner(ProcessRunner::new().with_timeout(config.codeql.timeout()))
    }

    pub fn with_analyze_args(mut self, args: Vec<String>) -> Self {
        self.analyze_args = args;
        self
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    /// `{db_root}/{project}`, parent of the database directory.
    pub fn database_dir(&self, project: &str) -> PathBuf {
        self.db_root.join(project)
    }

    pub fn database_path(&self, project: &str) -> PathBuf {
        self.database_dir(project).join(DATABASE_DIR)
    }

    pub fn result_path(&self, project: &str) -> PathBuf {
        self.source_root(project).join(RESULT_FILE)
    }

    pub fn source_root(&self, project: &str) -> PathBuf {
        self.repo_root.join(project)
    }

    fn create_command(&self, source: &Path, database: &Path, language: &str) -> CommandSpec {
        CommandSpec::new(&self.codeql)
            .args(["database", "create", "--overwrite"])
            .arg("--language")
            .arg(language.to_ascii_lowercase())
            .arg("--source-root")
            .arg(source.to_string_lossy())
            .arg(database.to_string_lossy())
    }

    fn analyze_command(&self, database: &Path, result: &Path) -> CommandSpec {
        CommandSpec::new(&self.codeql)
            .args(["database", "analyze"])
            .arg(database.to_string_lossy())
            .arg("--format=sarifv2.1.0")
            .arg("--output")
            .arg(result.to_string_lossy())
            .args(self.analyze_args.iter().cloned())
    }
}

#[async_trait]
impl AnalysisEngine for CodeqlClient {
    async fn build(&self, project: &str, language: &str) -> Result<(), AnalysisError> {
        let source = self.source_root(project);
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Err(AnalysisError::MissingSource {
                project: project.to_string(),
                path: source,
            });
        }
        let dir = self.database_dir(project);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| AnalysisError::Io { path: dir, source })?;

        let database = self.database_path(project);
        tracing::info!(project, language, database = %database.display(), "creating CodeQL database");
        let output = self
            .runner
            .run(&self.create_command(&source, &database, language))
            .await?;
        tracing::debug!(project, lines = output.lines().count(), "database create finished");
        Ok(())
    }

    async fn analyze(
        &self,
        project: &str,
        on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<(), AnalysisError> {
        let database = self.database_path(project);
        if !tokio::fs::try_exists(&database).await.unwrap_or(false) {
            return Err(AnalysisError::MissingDatabase {
                project: project.to_string(),
                path: database,
            });
        }
        let result = self.result_path(project);
        tracing::info!(project, result = %result.display(), "analyzing CodeQL database");

        let command = self.analyze_command(&database, &result);
        self.runner
            .run_streaming(&command, |line| {
                if let Some(progress) = extract_progress(line) {
                    on_progress(progress);
                }
            })
            .await?;
        Ok(())
    }
}
