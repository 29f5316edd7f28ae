/// Inline SQL migrations for the task-record database.
///
/// Applied in order; the `_migrations` table tracks which have already run.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: terminal job outcomes
    r#"
CREATE TABLE IF NOT EXISTS scan_tasks (
    id TEXT PRIMARY KEY,
    project TEXT NOT NULL,
    status TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#,
    // Migration 2: per-project history lookups
    r#"
CREATE INDEX IF NOT EXISTS idx_scan_tasks_project ON scan_tasks(project, created_at DESC);
"#,
];
