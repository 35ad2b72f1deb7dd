//! Worker error types.

use std::path::PathBuf;
use thiserror::Error;

use shorts_media::{FetchError, IntakeError, TransformError};
use shorts_models::{FailureKind, StageKind};
use shorts_publish::{AuthError, PublishError};

pub type StageResult<T> = Result<T, StageError>;
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Failure of a dispatched stage, recorded on its job.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("{stage} stage timed out after {secs} seconds")]
    Timeout { stage: StageKind, secs: u64 },

    #[error("Stage panicked: {0}")]
    Panicked(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StageError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classification stored on the job record.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            StageError::Fetch(_) => FailureKind::Fetch,
            StageError::Transform(_) => FailureKind::Transform,
            StageError::Auth(_) => FailureKind::Auth,
            StageError::Publish(PublishError::InvalidMetadata(_)) => FailureKind::InvalidMetadata,
            StageError::Publish(_) => FailureKind::Publish,
            StageError::Timeout { .. } | StageError::Panicked(_) | StageError::Internal(_) => {
                FailureKind::Internal
            }
        }
    }

    /// Fine-grained failure class for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Fetch(e) => e.kind(),
            StageError::Transform(e) => e.kind(),
            StageError::Auth(e) => e.kind(),
            StageError::Publish(e) => e.kind(),
            StageError::Timeout { .. } => "timeout",
            StageError::Panicked(_) => "panic",
            StageError::Internal(_) => "internal",
        }
    }
}

/// Synchronous pre-flight failure of a trigger; nothing was dispatched.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TriggerError {
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Whether the caller supplied bad input (as opposed to a server-side failure).
    pub fn is_client_error(&self) -> bool {
        match self {
            TriggerError::MissingField(_)
            | TriggerError::InvalidUrl(_)
            | TriggerError::FileNotFound(_)
            | TriggerError::InvalidMetadata(_)
            | TriggerError::NotAuthenticated => true,
            TriggerError::Auth(e) => !matches!(
                e,
                AuthError::Http(_) | AuthError::Io(_) | AuthError::Json(_)
            ),
            TriggerError::Intake(e) => !matches!(e, IntakeError::Disk(_)),
            TriggerError::Io(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            StageError::from(PublishError::invalid_metadata("empty title")).failure_kind(),
            FailureKind::InvalidMetadata
        );
        assert_eq!(
            StageError::from(PublishError::chunk_transfer("503")).failure_kind(),
            FailureKind::Publish
        );
        assert_eq!(
            StageError::from(FetchError::invalid_url("x")).failure_kind(),
            FailureKind::Fetch
        );
        let timeout = StageError::Timeout {
            stage: StageKind::Transform,
            secs: 5,
        };
        assert_eq!(timeout.failure_kind(), FailureKind::Internal);
        assert_eq!(timeout.to_string(), "transform stage timed out after 5 seconds");
    }

    #[test]
    fn test_client_errors() {
        assert!(TriggerError::MissingField("url").is_client_error());
        assert!(TriggerError::from(AuthError::malformed("bad")).is_client_error());
        assert!(TriggerError::from(IntakeError::Empty).is_client_error());
        assert!(!TriggerError::from(std::io::Error::new(std::io::ErrorKind::Other, "x"))
            .is_client_error());
    }
}
