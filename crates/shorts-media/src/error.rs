//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use shorts_models::ModelError;

/// Result type for low-level media commands.
pub type MediaResult<T> = Result<T, MediaError>;
/// Result type for the fetch stage.
pub type FetchResult<T> = Result<T, FetchError>;
/// Result type for the transform stage.
pub type TransformResult<T> = Result<T, TransformError>;
/// Result type for file intake.
pub type IntakeResult<T> = Result<T, IntakeError>;

/// Errors from external tools (FFmpeg, FFprobe, yt-dlp).
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("yt-dlp failed: {message}")]
    ToolFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn tool_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ToolFailed {
            message: message.into(),
            stderr,
        }
    }

    pub fn invalid_video(message: impl Into<String>) -> Self {
        Self::InvalidVideo(message.into())
    }
}

/// Failures of the fetch stage.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No progressive MP4 stream available for {0}")]
    NoStreamAvailable(String),

    #[error("Download tool error: {0}")]
    Tool(#[from] MediaError),

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),
}

impl FetchError {
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Machine-readable failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::Network(_) | FetchError::Http(_) => "network",
            FetchError::NoStreamAvailable(_) => "no_stream",
            FetchError::Tool(_) => "tool",
            FetchError::Disk(_) => "disk",
        }
    }
}

/// Failures of the transform stage.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    InvalidSpec(#[from] ModelError),

    #[error("Cannot decode source: {0}")]
    Decode(String),

    #[error("Invalid crop: {0}")]
    InvalidCrop(String),

    #[error("Encoding failed: {0}")]
    Encode(#[source] MediaError),

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),
}

impl TransformError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn invalid_crop(msg: impl Into<String>) -> Self {
        Self::InvalidCrop(msg.into())
    }

    /// Machine-readable failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            TransformError::InvalidSpec(_) => "invalid_spec",
            TransformError::Decode(_) => "decode",
            TransformError::InvalidCrop(_) => "crop_bounds",
            TransformError::Encode(_) => "encode",
            TransformError::Disk(_) => "disk",
        }
    }
}

/// Failures while storing an uploaded file.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Invalid file name: {0:?}")]
    InvalidFilename(String),

    #[error("Empty upload")]
    Empty,

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_kinds() {
        assert_eq!(FetchError::invalid_url("ftp://x").kind(), "invalid_url");
        assert_eq!(FetchError::network("reset").kind(), "network");
        assert_eq!(FetchError::NoStreamAvailable("u".into()).kind(), "no_stream");
        assert_eq!(FetchError::from(MediaError::YtDlpNotFound).kind(), "tool");
    }

    #[test]
    fn test_transform_error_kinds() {
        assert_eq!(TransformError::decode("corrupt").kind(), "decode");
        assert_eq!(TransformError::invalid_crop("x < 0").kind(), "crop_bounds");
        assert_eq!(TransformError::Encode(MediaError::FfmpegNotFound).kind(), "encode");
        assert_eq!(
            TransformError::from(ModelError::invalid_spec("ratio")).kind(),
            "invalid_spec"
        );
    }
}
