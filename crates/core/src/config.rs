// crates/core/src/config.rs
//! Service configuration, loaded once from YAML at startup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub gitlab: GitLabConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub codeql: CodeqlConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub supported_languages: Vec<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_on")]
    pub listen_on: String,
    /// Shared secret expected verbatim in the `Authorization` header.
    pub token: String,
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabConfig {
    pub token: String,
    /// REST API base, e.g. `https://gitlab.example.com/api/v4`. Derived from
    /// each repository URL when absent.
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root of all working copies (`{repo_path}/{project}`).
    pub repo_path: PathBuf,
    /// Root of all CodeQL databases (`{db_path}/{project}/codeql_db`).
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeqlConfig {
    #[serde(default = "default_codeql_path")]
    pub codeql_path: PathBuf,
    #[serde(default = "default_git_path")]
    pub git_path: PathBuf,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Extra arguments appended to `codeql database analyze`.
    #[serde(default)]
    pub analyze_args: Vec<String>,
}

impl Default for CodeqlConfig {
    fn default() -> Self {
        Self {
            codeql_path: default_codeql_path(),
            git_path: default_git_path(),
            timeout_secs: None,
            analyze_args: Vec::new(),
        }
    }
}

impl CodeqlConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_listen_on() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_codeql_path() -> PathBuf {
    PathBuf::from("codeql")
}

fn default_git_path() -> PathBuf {
    PathBuf::from("git")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("codescan.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Read, parse and validate the YAML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.token.trim().is_empty() {
            return Err(ConfigError::Invalid("server.token must not be empty".into()));
        }
        if self.gitlab.token.trim().is_empty() {
            return Err(ConfigError::Invalid("gitlab.token must not be empty".into()));
        }
        if self.storage.repo_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.repo_path must not be empty".into()));
        }
        if self.storage.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.db_path must not be empty".into()));
        }
        if self.supported_languages.is_empty() {
            return Err(ConfigError::Invalid(
                "supported_languages must list at least one language".into(),
            ));
        }
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.listen_on.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "server.listen_on is not a socket address: {}",
                self.server.listen_on
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const FULL: &str = r#"
server:
  listen_on: "127.0.0.1:9090"
  token: "shared-secret"
  static_dir: "./static"
gitlab:
  token: "glpat-abc"
  api_url: "https://gitlab.example.com/api/v4"
storage:
  repo_path: "/data/repos"
  db_path: "/data/codeql_dbs"
codeql:
  codeql_path: "/opt/codeql/codeql"
  git_path: "/usr/bin/git"
  timeout_secs: 3600
  analyze_args: ["--threads=4"]
database:
  path: "/data/codescan.db"
supported_languages: [java, python, go]
logging:
  level: debug
  format: json
"#;

    const MINIMAL: &str = r#"
server:
  token: "shared-secret"
gitlab:
  token: "glpat-abc"
storage:
  repo_path: "/data/repos"
  db_path: "/data/codeql_dbs"
supported_languages: [java]
"#;

    fn write(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write(FULL);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 9090);
        assert_eq!(config.server.static_dir, Some(PathBuf::from("./static")));
        assert_eq!(config.gitlab.api_url.as_deref(), Some("https://gitlab.example.com/api/v4"));
        assert_eq!(config.codeql.codeql_path, PathBuf::from("/opt/codeql/codeql"));
        assert_eq!(config.codeql.timeout(), Some(Duration::from_secs(3600)));
        assert_eq!(config.codeql.analyze_args, vec!["--threads=4".to_string()]);
        assert_eq!(config.supported_languages, vec!["java", "python", "go"]);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write(MINIMAL);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.listen_on, "0.0.0.0:8080");
        assert_eq!(config.codeql.codeql_path, PathBuf::from("codeql"));
        assert_eq!(config.codeql.git_path, PathBuf::from("git"));
        assert_eq!(config.codeql.timeout(), None);
        assert_eq!(config.database.path, PathBuf::from("codescan.db"));
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.gitlab.api_url.is_none());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Config::load("/nonexistent/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_bad_yaml_is_parse_error() {
        let file = write("server: [not, a, map");
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_empty_token_is_invalid() {
        let file = write(&MINIMAL.replace("shared-secret", ""));
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("server.token"));
    }

    #[test]
    fn test_empty_language_list_is_invalid() {
        let file = write(&MINIMAL.replace("[java]", "[]"));
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("supported_languages"));
    }

    #[test]
    fn test_bad_listen_address_is_invalid() {
        let file = write(&MINIMAL.replace("server:\n", "server:\n  listen_on: \"not-an-addr\"\n"));
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("listen_on"));
    }
}
