//! Model-level errors and failure classification.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid transform spec: {0}")]
    InvalidSpec(String),

    #[error("Invalid upload metadata: {0}")]
    InvalidMetadata(String),
}

impl ModelError {
    pub fn invalid_spec(msg: impl Into<String>) -> Self {
        Self::InvalidSpec(msg.into())
    }

    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

/// Machine-readable class of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Transform,
    Auth,
    Publish,
    InvalidMetadata,
    /// Panic or timeout caught at the job boundary
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Fetch => "fetch",
            FailureKind::Transform => "transform",
            FailureKind::Auth => "auth",
            FailureKind::Publish => "publish",
            FailureKind::InvalidMetadata => "invalid_metadata",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
