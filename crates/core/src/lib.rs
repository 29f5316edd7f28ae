// crates/core/src/lib.rs
pub mod codeql;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod process;
pub mod progress;
pub mod repo;

pub use codeql::CodeqlClient;
pub use config::Config;
pub use engine::{AnalysisEngine, SourceHost};
pub use error::*;
pub use fetcher::{select_language, GitFetcher};
pub use process::{CommandSpec, OutputStream, ProcessRunner};
pub use progress::{extract_progress, Phase, Progress};
pub use repo::{validate_project, RepoUrl};
