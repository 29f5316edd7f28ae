// crates/server-jobs/src/table.rs
//! Concurrent project → status map shared by pipelines and the HTTP layer.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::types::{JobEvent, JobSnapshot, JobStatus};

/// Live status of every in-flight job, keyed by project.
///
/// Only non-terminal statuses are stored. Terminal writes remove the entry
/// and are visible only to event subscribers.
pub struct StatusTable {
    jobs: DashMap<String, JobSnapshot>,
    admitted: DashMap<String, Instant>,
    events: broadcast::Sender<JobEvent>,
}

impl StatusTable {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            jobs: DashMap::new(),
            admitted: DashMap::new(),
            events,
        }
    }

    /// Claim the single pipeline slot for `project`.
    ///
    /// Returns `None` while another pipeline for the same project holds it.
    /// The slot is released when the guard is dropped.
    pub fn try_admit(self: &Arc<Self>, project: &str) -> Option<AdmissionGuard> {
        match self.admitted.entry(project.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(AdmissionGuard {
                    table: Arc::clone(self),
                    project: project.to_string(),
                })
            }
        }
    }

    pub fn is_admitted(&self, project: &str) -> bool {
        self.admitted.contains_key(project)
    }

    pub fn in_flight(&self) -> usize {
        self.admitted.len()
    }

    /// Record a non-terminal status for `project` (last write wins).
    pub fn report(&self, project: &str, status: JobStatus, progress: f32) {
        debug_assert!(!status.is_terminal());
        let snapshot = JobSnapshot::new(status, progress);
        self.jobs.insert(project.to_string(), snapshot.clone());
        self.broadcast(project, snapshot);
    }

    /// Terminal success: the entry is removed.
    pub fn finish(&self, project: &str) {
        self.jobs.remove(project);
        self.broadcast(project, JobSnapshot::new(JobStatus::Finished, 100.0));
    }

    /// Terminal failure: the entry is removed.
    pub fn fail(&self, project: &str, error: &str) {
        self.jobs.remove(project);
        self.broadcast(project, JobSnapshot::failed(error));
    }

    pub fn get(&self, project: &str) -> Option<JobSnapshot> {
        self.jobs.get(project).map(|entry| entry.value().clone())
    }

    /// All in-flight jobs, ordered by project.
    pub fn active(&self) -> Vec<JobEvent> {
        let mut jobs: Vec<JobEvent> = self
            .jobs
            .iter()
            .map(|entry| JobEvent::new(entry.key().clone(), entry.value().clone()))
            .collect();
        jobs.sort_by(|a, b| a.project.cmp(&b.project));
        jobs
    }

    /// Subscribe to every status write, terminal ones included.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    fn broadcast(&self, project: &str, snapshot: JobSnapshot) {
        // No subscribers is fine.
        let _ = self.events.send(JobEvent::new(project, snapshot));
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-flight token for one project.
///
/// Dropping the guard releases the slot. If the pipeline never wrote a
/// terminal status (it panicked or was aborted) the stale entry is failed.
pub struct AdmissionGuard {
    table: Arc<StatusTable>,
    project: String,
}

impl AdmissionGuard {
    pub fn project(&self) -> &str {
        &self.project
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if self.table.jobs.contains_key(&self.project) {
            tracing::error!(project = %self.project, "pipeline ended without a terminal status");
            self.table.fail(&self.project, "pipeline aborted");
        }
        if let Some((_, admitted_at)) = self.table.admitted.remove(&self.project) {
            tracing::debug!(
                project = %self.project,
                held_ms = admitted_at.elapsed().as_millis() as u64,
                "admission released"
            );
        }
    }
}
