// crates/server/src/pipeline.rs
//! Job pipeline: fetch → detect language → build → analyze, or a subset.
//!
//! Every accepted request runs as its own detached task. The task talks to
//! the outside world only through the status table and the task sink.

use std::sync::Arc;

use codescan_core::{
    AnalysisEngine, AnalysisError, FetchError, LanguageError, Phase, Progress, RepoUrl, SourceHost,
};
use codescan_db::{TaskRecord, TaskSink};
use codescan_server_jobs::{AdmissionGuard, JobStatus, StatusTable};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::metrics::{record_job, set_in_flight, StageTimer};

/// Entry point a job was submitted through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Scan,
    Build,
    Analyze,
    Clone,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Build => "build",
            Self::Analyze => "analyze",
            Self::Clone => "clone",
        }
    }
}

/// A validated job submission.
#[derive(Debug, Clone)]
pub enum JobRequest {
    /// fetch → detect language → build → analyze
    Scan { repo: RepoUrl, branch: String },
    /// build only
    Build { project: String, language: String },
    /// analyze only; the database must already exist
    Analyze { project: String },
    /// fetch only
    Clone { repo: RepoUrl, branch: String },
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Scan { .. } => JobKind::Scan,
            Self::Build { .. } => JobKind::Build,
            Self::Analyze { .. } => JobKind::Analyze,
            Self::Clone { .. } => JobKind::Clone,
        }
    }

    /// Key of the job in the status table.
    pub fn project(&self) -> &str {
        match self {
            Self::Scan { repo, .. } | Self::Clone { repo, .. } => repo.project(),
            Self::Build { project, .. } | Self::Analyze { project } => project,
        }
    }
}

/// Failure of one pipeline stage. The message is what callers see.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Language(#[from] LanguageError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Finished,
    Failed(String),
}

/// Submission was refused because the project already has a running job.
#[derive(Debug, Error)]
#[error("A job for {0} is already in progress")]
pub struct AlreadyRunning(pub String);

#[derive(Clone)]
pub struct Pipeline {
    jobs: Arc<StatusTable>,
    source: Arc<dyn SourceHost>,
    engine: Arc<dyn AnalysisEngine>,
    sink: Arc<dyn TaskSink>,
}

impl Pipeline {
    pub fn new(
        jobs: Arc<StatusTable>,
        source: Arc<dyn SourceHost>,
        engine: Arc<dyn AnalysisEngine>,
        sink: Arc<dyn TaskSink>,
    ) -> Self {
        Self {
            jobs,
            source,
            engine,
            sink,
        }
    }

    /// Admit `request`, mark it queued and start it in the background.
    ///
    /// The job is visible in the status table before this returns.
    pub fn submit(&self, request: JobRequest) -> Result<JoinHandle<JobOutcome>, AlreadyRunning> {
        let project = request.project().to_string();
        let guard = self
            .jobs
            .try_admit(&project)
            .ok_or_else(|| AlreadyRunning(project.clone()))?;
        self.jobs.report(&project, JobStatus::Queued, 0.0);
        set_in_flight(self.jobs.in_flight());

        let kind = request.kind();
        tracing::info!(project = %project, kind = kind.as_str(), "job accepted");
        let span = tracing::info_span!("pipeline", project = %project, kind = kind.as_str());
        let pipeline = self.clone();
        Ok(tokio::spawn(
            async move { pipeline.run(request, guard).await }.instrument(span),
        ))
    }

    async fn run(&self, request: JobRequest, guard: AdmissionGuard) -> JobOutcome {
        let kind = request.kind();
        let project = guard.project().to_string();

        let outcome = match self.execute(&request).await {
            Ok(()) => {
                tracing::info!("job finished");
                self.record(TaskRecord::finished(&project)).await;
                self.jobs.finish(&project);
                JobOutcome::Finished
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(error = %message, "job failed");
                self.record(TaskRecord::failed(&project, &message)).await;
                self.jobs.fail(&project, &message);
                JobOutcome::Failed(message)
            }
        };

        record_job(
            kind.as_str(),
            match outcome {
                JobOutcome::Finished => "finished",
                JobOutcome::Failed(_) => "failed",
            },
        );
        drop(guard);
        set_in_flight(self.jobs.in_flight());
        outcome
    }

    async fn execute(&self, request: &JobRequest) -> Result<(), PipelineError> {
        match request {
            JobRequest::Scan { repo, branch } => {
                self.fetch(repo, branch).await?;
                let language = self.detect_language(repo).await?;
                self.build(repo.project(), &language).await?;
                self.analyze(repo.project()).await
            }
            JobRequest::Clone { repo, branch } => self.fetch(repo, branch).await,
            JobRequest::Build { project, language } => self.build(project, language).await,
            JobRequest::Analyze { project } => self.analyze(project).await,
        }
    }

    async fn fetch(&self, repo: &RepoUrl, branch: &str) -> Result<(), PipelineError> {
        tracing::info!(stage = "fetch", branch, "fetching repository");
        let timer = StageTimer::new("fetch");
        let result = self.source.fetch(repo, branch).await;
        timer.finish();
        result?;
        Ok(())
    }

    async fn detect_language(&self, repo: &RepoUrl) -> Result<String, PipelineError> {
        tracing::info!(stage = "detect_language", "detecting project language");
        let timer = StageTimer::new("detect_language");
        let result = self.source.detect_language(repo).await;
        timer.finish();
        Ok(result?)
    }

    async fn build(&self, project: &str, language: &str) -> Result<(), PipelineError> {
        tracing::info!(stage = "build", language, "building analysis database");
        self.jobs.report(project, JobStatus::Building, 0.0);
        let timer = StageTimer::new("build");
        let result = self.engine.build(project, language).await;
        timer.finish();
        result?;
        Ok(())
    }

    async fn analyze(&self, project: &str) -> Result<(), PipelineError> {
        tracing::info!(stage = "analyze", "analyzing database");
        let jobs = Arc::clone(&self.jobs);
        let mut on_progress = |progress: Progress| {
            let status = match progress.phase {
                Phase::Loading => JobStatus::Loading,
                Phase::Evaluating => JobStatus::Evaluating,
            };
            jobs.report(project, status, progress.percentage());
        };
        let timer = StageTimer::new("analyze");
        // Returns only once the output is drained, so no progress write can
        // land after the terminal status.
        let result = self.engine.analyze(project, &mut on_progress).await;
        timer.finish();
        result?;
        Ok(())
    }

    async fn record(&self, record: TaskRecord) {
        if let Err(e) = self.sink.record(&record).await {
            tracing::error!(error = %e, status = record.status.as_str(), "failed to persist task record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use codescan_db::{MemoryTaskSink, TaskStatus};
    use codescan_server_jobs::JobEvent;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Source host whose fetch/detect results are fixed up front.
    struct FakeSource {
        fetch_fails: bool,
        languages: Option<BTreeMap<String, f64>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeSource {
        fn ok(language: &str) -> Self {
            Self {
                fetch_fails: false,
                languages: Some([(language.to_string(), 100.0)].into()),
                calls: Mutex::default(),
            }
        }

        fn unsupported() -> Self {
            Self {
                fetch_fails: false,
                languages: None,
                calls: Mutex::default(),
            }
        }

        fn failing_fetch() -> Self {
            Self {
                fetch_fails: true,
                languages: None,
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SourceHost for FakeSource {
        async fn fetch(&self, repo: &RepoUrl, _branch: &str) -> Result<String, FetchError> {
            self.calls.lock().unwrap().push("fetch");
            if self.fetch_fails {
                return Err(FetchError::InvalidBranch("nope".into()));
            }
            Ok(repo.project().to_string())
        }

        async fn detect_language(&self, repo: &RepoUrl) -> Result<String, LanguageError> {
            self.calls.lock().unwrap().push("detect");
            match &self.languages {
                Some(langs) => Ok(langs.keys().next().cloned().unwrap_or_default()),
                None => Err(LanguageError::Unsupported {
                    project: repo.project().to_string(),
                    languages: [("Shell".to_string(), 60.0), ("Dockerfile".to_string(), 40.0)].into(),
                }),
            }
        }
    }

    /// Engine that emits a fixed progress script; build can be held open.
    #[derive(Default)]
    struct FakeEngine {
        progress: Vec<Progress>,
        analyze_fails: bool,
        hold_build: Option<Arc<Notify>>,
        built: Mutex<Vec<(String, String)>>,
        analyzed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AnalysisEngine for FakeEngine {
        async fn build(&self, project: &str, language: &str) -> Result<(), AnalysisError> {
            if let Some(release) = &self.hold_build {
                release.notified().await;
            }
            self.built
                .lock()
                .unwrap()
                .push((project.to_string(), language.to_string()));
            Ok(())
        }

        async fn analyze(
            &self,
            project: &str,
            on_progress: &mut (dyn FnMut(Progress) + Send),
        ) -> Result<(), AnalysisError> {
            self.analyzed.lock().unwrap().push(project.to_string());
            for p in &self.progress {
                on_progress(*p);
            }
            if self.analyze_fails {
                return Err(AnalysisError::MissingDatabase {
                    project: project.to_string(),
                    path: "/dbs/missing/codeql_db".into(),
                });
            }
            Ok(())
        }
    }

    fn progress(phase: Phase, current: u64, total: u64) -> Progress {
        Progress {
            phase,
            current,
            total,
        }
    }

    fn repo() -> RepoUrl {
        RepoUrl::parse("https://gitlab.example.com/group/myproj").unwrap()
    }

    fn scan() -> JobRequest {
        JobRequest::Scan {
            repo: repo(),
            branch: "main".into(),
        }
    }

    struct Harness {
        jobs: Arc<StatusTable>,
        sink: Arc<MemoryTaskSink>,
        pipeline: Pipeline,
    }

    fn harness(source: Arc<FakeSource>, engine: Arc<FakeEngine>) -> Harness {
        let jobs = Arc::new(StatusTable::new());
        let sink = Arc::new(MemoryTaskSink::new());
        let pipeline = Pipeline::new(Arc::clone(&jobs), source, engine, sink.clone());
        Harness {
            jobs,
            sink,
            pipeline,
        }
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<JobEvent>) -> Vec<(JobStatus, f32)> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| (e.snapshot.status, e.snapshot.progress))
            .collect()
    }

    #[tokio::test]
    async fn test_full_scan_walks_every_state() {
        let source = Arc::new(FakeSource::ok("Java"));
        let engine = Arc::new(FakeEngine {
            progress: vec![
                progress(Phase::Loading, 1, 2),
                progress(Phase::Loading, 2, 2),
                progress(Phase::Evaluating, 1, 4),
                progress(Phase::Evaluating, 4, 4),
            ],
            ..Default::default()
        });
        let h = harness(source.clone(), engine.clone());
        let mut rx = h.jobs.subscribe();

        let outcome = h.pipeline.submit(scan()).unwrap().await.unwrap();
        assert_eq!(outcome, JobOutcome::Finished);

        assert_eq!(
            drain(&mut rx),
            vec![
                (JobStatus::Queued, 0.0),
                (JobStatus::Building, 0.0),
                (JobStatus::Loading, 50.0),
                (JobStatus::Loading, 100.0),
                (JobStatus::Evaluating, 25.0),
                (JobStatus::Evaluating, 100.0),
                (JobStatus::Finished, 100.0),
            ]
        );
        assert_eq!(source.calls(), vec!["fetch", "detect"]);
        assert_eq!(
            *engine.built.lock().unwrap(),
            vec![("group/myproj".to_string(), "Java".to_string())]
        );
        assert!(h.jobs.get("group/myproj").is_none());

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].project, "group/myproj");
        assert_eq!(records[0].status, TaskStatus::Finished);
        assert_eq!(records[0].content, "task completed");
    }

    #[tokio::test]
    async fn test_unsupported_language_stops_before_build() {
        let source = Arc::new(FakeSource::unsupported());
        let engine = Arc::new(FakeEngine::default());
        let h = harness(source, engine.clone());

        let outcome = h.pipeline.submit(scan()).unwrap().await.unwrap();
        let JobOutcome::Failed(message) = outcome else {
            panic!("expected failure");
        };
        assert!(message.contains("Shell") && message.contains("Dockerfile"), "{message}");
        assert!(engine.built.lock().unwrap().is_empty());

        let records = h.sink.records();
        assert_eq!(records[0].status, TaskStatus::Failed);
        assert_eq!(records[0].content, format!("task failed: {message}"));
        assert!(h.jobs.get("group/myproj").is_none());
    }

    #[tokio::test]
    async fn test_clone_only_runs_fetch() {
        let source = Arc::new(FakeSource::ok("Go"));
        let engine = Arc::new(FakeEngine::default());
        let h = harness(source.clone(), engine.clone());

        let request = JobRequest::Clone {
            repo: repo(),
            branch: "main".into(),
        };
        assert_eq!(request.kind(), JobKind::Clone);
        let outcome = h.pipeline.submit(request).unwrap().await.unwrap();
        assert_eq!(outcome, JobOutcome::Finished);
        assert_eq!(source.calls(), vec!["fetch"]);
        assert!(engine.built.lock().unwrap().is_empty());
        assert!(engine.analyzed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_terminal() {
        let source = Arc::new(FakeSource::failing_fetch());
        let engine = Arc::new(FakeEngine::default());
        let h = harness(source.clone(), engine);

        let outcome = h.pipeline.submit(scan()).unwrap().await.unwrap();
        assert!(matches!(outcome, JobOutcome::Failed(_)));
        assert_eq!(source.calls(), vec!["fetch"]);
    }

    #[tokio::test]
    async fn test_build_only_does_not_analyze() {
        let engine = Arc::new(FakeEngine::default());
        let h = harness(Arc::new(FakeSource::ok("Java")), engine.clone());

        let outcome = h
            .pipeline
            .submit(JobRequest::Build {
                project: "group/app".into(),
                language: "python".into(),
            })
            .unwrap()
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Finished);
        assert_eq!(engine.built.lock().unwrap().len(), 1);
        assert!(engine.analyzed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_failure_after_progress_is_failed() {
        let engine = Arc::new(FakeEngine {
            progress: vec![progress(Phase::Loading, 1, 4)],
            analyze_fails: true,
            ..Default::default()
        });
        let h = harness(Arc::new(FakeSource::ok("Java")), engine);
        let mut rx = h.jobs.subscribe();

        let outcome = h
            .pipeline
            .submit(JobRequest::Analyze {
                project: "group/app".into(),
            })
            .unwrap()
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Failed(ref m) if m.contains("No CodeQL database")));
        let events = drain(&mut rx);
        assert_eq!(events.last().unwrap().0, JobStatus::Failed);
        assert_eq!(events[1], (JobStatus::Loading, 25.0));
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_refused_while_running() {
        let release = Arc::new(Notify::new());
        let engine = Arc::new(FakeEngine {
            hold_build: Some(release.clone()),
            ..Default::default()
        });
        let h = harness(Arc::new(FakeSource::ok("Java")), engine);
        let build = || JobRequest::Build {
            project: "group/app".into(),
            language: "java".into(),
        };

        let running = h.pipeline.submit(build()).unwrap();
        assert!(h.pipeline.submit(build()).is_err());

        // Wait until the build stage is reached, then let it finish.
        while h.jobs.get("group/app").map(|s| s.status) != Some(JobStatus::Building) {
            tokio::task::yield_now().await;
        }
        release.notify_one();
        assert_eq!(running.await.unwrap(), JobOutcome::Finished);

        // Slot released: resubmission is accepted.
        release.notify_one();
        let again = h.pipeline.submit(build()).unwrap();
        assert_eq!(again.await.unwrap(), JobOutcome::Finished);
    }

    #[tokio::test]
    async fn test_queued_is_visible_on_return() {
        let release = Arc::new(Notify::new());
        let engine = Arc::new(FakeEngine {
            hold_build: Some(release.clone()),
            ..Default::default()
        });
        let h = harness(Arc::new(FakeSource::ok("Java")), engine);

        let handle = h
            .pipeline
            .submit(JobRequest::Build {
                project: "app".into(),
                language: "go".into(),
            })
            .unwrap();
        let status = h.jobs.get("app").unwrap().status;
        assert!(matches!(status, JobStatus::Queued | JobStatus::Building));
        release.notify_one();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_change_outcome() {
        let jobs = Arc::new(StatusTable::new());
        let pipeline = Pipeline::new(
            Arc::clone(&jobs),
            Arc::new(FakeSource::ok("Java")),
            Arc::new(FakeEngine::default()),
            Arc::new(MemoryTaskSink::rejecting()),
        );
        let outcome = pipeline
            .submit(JobRequest::Analyze {
                project: "app".into(),
            })
            .unwrap()
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Finished);
        assert!(jobs.get("app").is_none());
        assert_eq!(jobs.in_flight(), 0);
    }
}
