//! Job lifecycle metrics.

use metrics::{counter, histogram};

use shorts_models::{FailureKind, StageKind};

/// Metric name constants for consistency.
pub mod names {
    /// Jobs handed to the runner, by stage.
    pub const JOBS_DISPATCHED_TOTAL: &str = "shorts_jobs_dispatched_total";

    /// Jobs that finished successfully, by stage.
    pub const JOBS_SUCCEEDED_TOTAL: &str = "shorts_jobs_succeeded_total";

    /// Jobs that failed, by stage and failure kind.
    pub const JOBS_FAILED_TOTAL: &str = "shorts_jobs_failed_total";

    /// Stage run time in seconds, by stage.
    pub const JOB_DURATION_SECONDS: &str = "shorts_job_duration_seconds";
}

pub fn record_dispatched(stage: StageKind) {
    counter!(names::JOBS_DISPATCHED_TOTAL, "stage" => stage.as_str()).increment(1);
}

pub fn record_succeeded(stage: StageKind, duration_secs: f64) {
    counter!(names::JOBS_SUCCEEDED_TOTAL, "stage" => stage.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "stage" => stage.as_str()).record(duration_secs);
}

pub fn record_failed(stage: StageKind, kind: FailureKind, duration_secs: f64) {
    counter!(
        names::JOBS_FAILED_TOTAL,
        "stage" => stage.as_str(),
        "kind" => kind.as_str()
    )
    .increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "stage" => stage.as_str()).record(duration_secs);
}
