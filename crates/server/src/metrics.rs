//! Prometheus metrics for pipeline runs.
//!
//! - `codescan_jobs_total{kind,outcome}` counts terminal outcomes
//! - `codescan_stage_duration_seconds{stage}` times each pipeline stage
//! - `codescan_jobs_in_flight` tracks admitted pipelines

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Returns `false` if already installed.
pub fn init_metrics() -> bool {
    let mut installed = false;
    PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Failed to set global metrics recorder (already set)");
        } else {
            describe_metrics();
            installed = true;
            tracing::info!("Prometheus metrics initialized");
        }
        handle
    });
    installed
}

fn describe_metrics() {
    describe_counter!(
        "codescan_jobs_total",
        "Pipeline runs that reached a terminal status, by kind and outcome"
    );
    describe_histogram!(
        "codescan_stage_duration_seconds",
        "Duration of individual pipeline stages in seconds"
    );
    describe_gauge!("codescan_jobs_in_flight", "Pipelines currently admitted");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_job(kind: &str, outcome: &str) {
    counter!("codescan_jobs_total", "kind" => kind.to_string(), "outcome" => outcome.to_string())
        .increment(1);
}

pub fn record_stage(stage: &str, duration: Duration) {
    histogram!("codescan_stage_duration_seconds", "stage" => stage.to_string())
        .record(duration.as_secs_f64());
}

pub fn set_in_flight(count: usize) {
    gauge!("codescan_jobs_in_flight").set(count as f64);
}

/// Times one pipeline stage; the duration is recorded on `finish`.
pub struct StageTimer {
    stage: &'static str,
    start: Instant,
}

impl StageTimer {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            start: Instant::now(),
        }
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        record_stage(self.stage, elapsed);
        elapsed
    }
}
