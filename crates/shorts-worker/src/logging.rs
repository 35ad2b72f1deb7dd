//! Structured job logging.
//!
//! Every job lifecycle line carries the same `job_id` and `stage` fields so a
//! job can be followed through the log regardless of which task emitted it.

use tracing::{error, info, warn, Span};

use shorts_models::{JobId, StageKind};

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stage: StageKind,
}

impl JobLogger {
    pub fn new(job_id: &JobId, stage: StageKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "Job started: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, stage = %self.stage, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, stage = %self.stage, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    /// Span wrapping the stage future.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, stage = %self.stage)
    }
}
