// crates/db/src/lib.rs
//! Durable, append-only record of terminal job outcomes.

mod migrations;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),

    #[error("Corrupt task record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Task sink unavailable: {0}")]
    Unavailable(String),
}

pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Finished,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown task status {other:?}")),
        }
    }
}

/// One terminal outcome of a pipeline run. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub project: String,
    pub status: TaskStatus,
    pub content: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl TaskRecord {
    fn new(project: &str, status: TaskStatus, content: String) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            project: project.to_string(),
            status,
            content,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn finished(project: &str) -> Self {
        Self::new(project, TaskStatus::Finished, "task completed".to_string())
    }

    pub fn failed(project: &str, error: &str) -> Self {
        Self::new(project, TaskStatus::Failed, format!("task failed: {error}"))
    }
}

/// Append-only destination for terminal job outcomes.
#[async_trait]
pub trait TaskSink: Send + Sync {
    async fn record(&self, record: &TaskRecord) -> SinkResult<()>;
}

/// SQLite-backed sink.
#[derive(Debug, Clone)]
pub struct SqliteTaskSink {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteTaskSink {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn new(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let sink = Self {
            pool,
            db_path: path.to_owned(),
        };
        sink.run_migrations().await?;

        info!("Task database opened at {}", path.display());
        Ok(sink)
    }

    /// In-memory database (for testing). A single connection keeps every
    /// query on the same database.
    pub async fn new_in_memory() -> SinkResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let sink = Self {
            pool,
            db_path: PathBuf::new(),
        };
        sink.run_migrations().await?;
        Ok(sink)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn run_migrations(&self) -> SinkResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1;
            if version > current_version {
                sqlx::query(migration).execute(&self.pool).await?;
                sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                    .bind(version as i64)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Most recent records for `project`, newest first.
    pub async fn history(&self, project: &str, limit: i64) -> SinkResult<Vec<TaskRecord>> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, project, status, content, created_at FROM scan_tasks
             WHERE project = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(project)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, project, status, content, created_at)| {
                let status = status
                    .parse()
                    .map_err(|reason| SinkError::Corrupt { id: id.clone(), reason })?;
                Ok(TaskRecord {
                    id,
                    project,
                    status,
                    content,
                    created_at,
                })
            })
            .collect()
    }

    pub async fn count(&self) -> SinkResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scan_tasks")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl TaskSink for SqliteTaskSink {
    async fn record(&self, record: &TaskRecord) -> SinkResult<()> {
        sqlx::query(
            "INSERT INTO scan_tasks (id, project, status, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.project)
        .bind(record.status.as_str())
        .bind(&record.content)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Sink that keeps records in memory. Used by tests and when no database
/// is wanted.
#[derive(Debug, Default)]
pub struct MemoryTaskSink {
    records: Mutex<Vec<TaskRecord>>,
    reject: bool,
}

impl MemoryTaskSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every write fails.
    pub fn rejecting() -> Self {
        Self {
            records: Mutex::default(),
            reject: true,
        }
    }

    pub fn records(&self) -> Vec<TaskRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskSink for MemoryTaskSink {
    async fn record(&self, record: &TaskRecord) -> SinkResult<()> {
        if self.reject {
            return Err(SinkError::Unavailable("writes disabled".to_string()));
        }
        let mut records = self
            .records
            .lock()
            .map_err(|_| SinkError::Unavailable("lock poisoned".to_string()))?;
        records.push(record.clone());
        Ok(())
    }
}
