//! Job records for dispatched pipeline stages.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::asset::MediaAsset;
use crate::error::FailureKind;
use crate::progress::ProgressEvent;
use crate::video::RemoteVideoId;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which pipeline stage a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Fetch,
    Transform,
    Publish,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Fetch => "fetch",
            StageKind::Transform => "transform",
            StageKind::Publish => "publish",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, waiting for a worker slot
    #[default]
    Queued,
    /// Stage is executing
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Fetch or transform produced a local file
    Asset(MediaAsset),
    /// Publish produced a remote video
    Published { video_id: RemoteVideoId },
}

impl JobOutcome {
    pub fn asset(&self) -> Option<&MediaAsset> {
        match self {
            JobOutcome::Asset(asset) => Some(asset),
            JobOutcome::Published { .. } => None,
        }
    }

    pub fn video_id(&self) -> Option<&RemoteVideoId> {
        match self {
            JobOutcome::Published { video_id } => Some(video_id),
            JobOutcome::Asset(_) => None,
        }
    }
}

/// Classified failure recorded on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobSnapshot {
    pub id: JobId,
    pub stage: StageKind,
    pub state: JobState,
    /// Most recent progress event
    pub progress: ProgressEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    /// A freshly dispatched job.
    pub fn queued(id: JobId, stage: StageKind) -> Self {
        Self {
            id,
            stage,
            state: JobState::Queued,
            progress: ProgressEvent::queued(),
            outcome: None,
            failure: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_succeeded(&mut self, outcome: JobOutcome) {
        self.state = JobState::Succeeded;
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, failure: JobFailure) {
        self.state = JobState::Failed;
        self.failure = Some(failure);
        self.finished_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert_eq!(JobId::from_string("abc").to_string(), "abc");
    }

    #[test]
    fn test_snapshot_lifecycle() {
        let mut snap = JobSnapshot::queued(JobId::new(), StageKind::Transform);
        assert_eq!(snap.state, JobState::Queued);
        assert!(!snap.is_terminal());

        snap.mark_running();
        assert!(snap.started_at.is_some());

        snap.mark_failed(JobFailure::new(FailureKind::Transform, "encode failed"));
        assert!(snap.is_terminal());
        assert_eq!(snap.failure.as_ref().unwrap().to_string(), "transform: encode failed");
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = JobOutcome::Published {
            video_id: RemoteVideoId::from("dQw4w9WgXcQ"),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["type"], "published");
        assert_eq!(json["video_id"], "dQw4w9WgXcQ");
        assert_eq!(outcome.video_id().unwrap().as_str(), "dQw4w9WgXcQ");
    }
}
