// crates/core/src/error.rs
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when decomposing a repository URL or project path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoUrlError {
    #[error("Invalid repository URL: {url}")]
    Malformed { url: String },

    #[error("Invalid project path: {project}")]
    InvalidProject { project: String },
}

/// Errors raised while running an external command
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed ({exit}):\n{output}")]
    ExternalTool {
        command: String,
        exit: String,
        output: String,
    },

    #[error("{command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("IO error while running {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while materializing a working copy
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    MalformedUrl(#[from] RepoUrlError),

    #[error("Invalid branch name: {0}")]
    InvalidBranch(String),

    #[error("Failed to sync existing checkout of {project}: {source}")]
    Sync {
        project: String,
        #[source]
        source: ProcessError,
    },

    #[error("Failed to clone {project}: {source}")]
    Clone {
        project: String,
        #[source]
        source: ProcessError,
    },

    #[error("IO error preparing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while detecting a project's dominant language
#[derive(Debug, Error)]
pub enum LanguageError {
    #[error(transparent)]
    MalformedUrl(#[from] RepoUrlError),

    #[error("Language API request for {project} failed: {message}")]
    Api { project: String, message: String },

    #[error("No supported language found for {project}: {languages:?}")]
    Unsupported {
        project: String,
        languages: BTreeMap<String, f64>,
    },
}

/// Errors that can occur while building or analyzing a CodeQL database
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No working copy for {project} at {path}")]
    MissingSource { project: String, path: PathBuf },

    #[error("No CodeQL database for {project} at {path}")]
    MissingDatabase { project: String, path: PathBuf },

    #[error("IO error preparing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tool(#[from] ProcessError),
}

/// Errors that can occur when loading the service configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
