// crates/core/src/repo.rs
//! Repository handles parsed from hosting URLs.
//!
//! A URL such as `https://gitlab.example.com/group/myproj` is split on `/`
//! into exactly four parts: scheme (`https:`), the empty segment between the
//! two slashes, host, and the project path (`group/myproj`). The project path
//! is the job key and addresses the working copy and database on disk.

use std::fmt;

use crate::error::RepoUrlError;

/// A repository hosted on a GitLab-style server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    scheme: String,
    host: String,
    project: String,
}

impl RepoUrl {
    /// Decompose a repository URL into scheme, host and project path.
    pub fn parse(url: &str) -> Result<Self, RepoUrlError> {
        let malformed = || RepoUrlError::Malformed {
            url: url.to_string(),
        };

        let parts: Vec<&str> = url.trim().splitn(4, '/').collect();
        let [scheme, separator, host, project] = parts.as_slice() else {
            return Err(malformed());
        };
        if scheme.len() < 2 || !scheme.ends_with(':') || !separator.is_empty() || host.is_empty() {
            return Err(malformed());
        }
        let project = validate_project(project).map_err(|_| malformed())?;

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            project: project.to_string(),
        })
    }

    /// Scheme including the trailing colon, e.g. `https:`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Project path (`group/subgroup/name`), the job key.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Clone URL with an OAuth2 token embedded as credentials.
    pub fn authenticated_clone_url(&self, token: &str) -> String {
        format!(
            "{}//oauth2:{}@{}/{}.git",
            self.scheme, token, self.host, self.project
        )
    }

    /// Base URL of the host's REST API (`{scheme}//{host}/api/v4`).
    pub fn api_base(&self) -> String {
        format!("{}//{}/api/v4", self.scheme, self.host)
    }

    /// URL of the per-project language breakdown under `api_base`.
    pub fn languages_url(&self, api_base: &str) -> String {
        format!(
            "{}/projects/{}/languages",
            api_base.trim_end_matches('/'),
            urlencoding::encode(&self.project)
        )
    }
}

impl fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}//{}/{}", self.scheme, self.host, self.project)
    }
}

/// Check that a project path is safe to join onto a storage root.
///
/// Rejects empty paths, absolute paths, empty segments and `.`/`..`
/// segments. Returns the path unchanged when valid.
pub fn validate_project(project: &str) -> Result<&str, RepoUrlError> {
    let invalid = || RepoUrlError::InvalidProject {
        project: project.to_string(),
    };
    if project.is_empty() || project.contains('\\') || project.contains('\0') {
        return Err(invalid());
    }
    for segment in project.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(invalid());
        }
    }
    Ok(project)
}
