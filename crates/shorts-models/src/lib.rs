//! Shared data models for the shorts pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Media assets handed between pipeline stages
//! - Transform and encoding parameters
//! - Upload metadata
//! - Jobs, progress events and failure classification

pub mod asset;
pub mod encoding;
pub mod error;
pub mod job;
pub mod metadata;
pub mod progress;
pub mod source;
pub mod transform;
pub mod video;

// Re-export common types
pub use asset::MediaAsset;
pub use encoding::EncodingProfile;
pub use error::{FailureKind, ModelError};
pub use job::{JobFailure, JobId, JobOutcome, JobSnapshot, JobState, StageKind};
pub use metadata::{PrivacyStatus, UploadMetadata};
pub use progress::ProgressEvent;
pub use source::SourceKind;
pub use transform::{AspectRatio, AspectRatioParseError, TransformSpec, ASPECT_TOLERANCE};
pub use video::RemoteVideoId;
