// crates/server-jobs/src/types.rs
//! Types for the job status table.

use serde::{Serialize, Serializer};

/// Status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Building,
    Loading,
    Evaluating,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Building => "building",
            Self::Loading => "loading",
            Self::Evaluating => "evaluating",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// Point-in-time status of one job, as returned by `GET /status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    #[serde(serialize_with = "whole_as_integer")]
    pub progress: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobSnapshot {
    pub fn new(status: JobStatus, progress: f32) -> Self {
        Self {
            status,
            progress,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: 0.0,
            error: Some(error.into()),
        }
    }
}

/// Status change for one project, broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub project: String,
    #[serde(flatten)]
    pub snapshot: JobSnapshot,
    pub timestamp: String,
}

impl JobEvent {
    pub fn new(project: impl Into<String>, snapshot: JobSnapshot) -> Self {
        Self {
            project: project.into(),
            snapshot,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// `0.0` → `0`, `37.5` → `37.5`.
fn whole_as_integer<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() && value.fract() == 0.0 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f32(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_in_progress_shape() {
        let json = serde_json::to_string(&JobSnapshot::new(JobStatus::Building, 0.0)).unwrap();
        assert_eq!(json, r#"{"status":"building","progress":0}"#);
    }

    #[test]
    fn test_fractional_progress_stays_float() {
        let json = serde_json::to_value(JobSnapshot::new(JobStatus::Evaluating, 37.5)).unwrap();
        assert_eq!(json["progress"], serde_json::json!(37.5));
    }

    #[test]
    fn test_failed_snapshot_carries_error() {
        let json = serde_json::to_value(JobSnapshot::failed("clone failed")).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "clone failed");
    }

    #[test]
    fn test_event_flattens_snapshot() {
        let event = JobEvent::new("group/app", JobSnapshot::new(JobStatus::Loading, 50.0));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["project"], "group/app");
        assert_eq!(json["status"], "loading");
        assert_eq!(json["progress"], 50);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Finished.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Evaluating.is_terminal());
        assert_eq!(JobStatus::Evaluating.as_str(), "evaluating");
    }
}
