//! Prometheus metrics for the worker.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const ASSEMBLY_RUNS_TOTAL: &str = "reel_assembly_runs_total";
    pub const CONCAT_FALLBACKS_TOTAL: &str = "reel_concat_fallbacks_total";
    pub const MIX_SKIPPED_TOTAL: &str = "reel_mix_skipped_total";
    pub const PUBLISH_RUNS_TOTAL: &str = "reel_publish_runs_total";
    pub const STAGE_DURATION_SECONDS: &str = "reel_stage_duration_seconds";
    pub const JOBS_COMPLETED_TOTAL: &str = "reel_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "reel_jobs_failed_total";
}

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("Failed to install Prometheus exporter: {e}")))
}

/// Record the end of an assembly run (`completed` or an error kind).
pub fn record_assembly_run(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::ASSEMBLY_RUNS_TOTAL, &labels).increment(1);
}

/// Record a concat strategy falling back to stream copy.
pub fn record_concat_fallback(requested: &str) {
    let labels = [("requested", requested.to_string())];
    counter!(names::CONCAT_FALLBACKS_TOTAL, &labels).increment(1);
}

pub fn record_mix_skipped() {
    counter!(names::MIX_SKIPPED_TOTAL).increment(1);
}

/// Record the end of a publish run (`published` or an error kind).
pub fn record_publish_run(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::PUBLISH_RUNS_TOTAL, &labels).increment(1);
}

pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_completed(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_job_failed(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}
