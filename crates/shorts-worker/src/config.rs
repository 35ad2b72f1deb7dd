//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use shorts_models::{AspectRatio, EncodingProfile, TransformSpec};
use shorts_publish::DEFAULT_CHUNK_SIZE;

/// Configuration shared by every stage the pipeline dispatches.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory for fetched and uploaded source files
    pub intake_dir: PathBuf,
    /// Directory for transformed shorts
    pub processed_dir: PathBuf,
    /// Persisted session file
    pub session_path: PathBuf,
    /// Trim, crop and encoder parameters
    pub transform: TransformSpec,
    /// Upload chunk size in bytes
    pub upload_chunk_bytes: usize,
    /// Maximum concurrently running stages
    pub max_concurrent_jobs: usize,
    /// Wall-clock limit for a single stage
    pub stage_timeout: Duration,
    /// Per-request network timeout
    pub http_timeout: Duration,
    /// How long finished jobs stay queryable
    pub job_retention: Duration,
    /// How long to wait for the user to grant consent
    pub consent_timeout: Duration,
    /// FFmpeg binary; looked up in PATH when unset
    pub ffmpeg_path: Option<PathBuf>,
    /// FFprobe binary; looked up in PATH when unset
    pub ffprobe_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            intake_dir: PathBuf::from("uploads"),
            processed_dir: PathBuf::from("processed"),
            session_path: PathBuf::from("session.json"),
            transform: TransformSpec::default(),
            upload_chunk_bytes: DEFAULT_CHUNK_SIZE,
            max_concurrent_jobs: 4,
            stage_timeout: Duration::from_secs(3600), // 1 hour
            http_timeout: Duration::from_secs(300),
            job_retention: Duration::from_secs(3600),
            consent_timeout: Duration::from_secs(300),
            ffmpeg_path: None,
            ffprobe_path: None,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let encoding = EncodingProfile {
            codec: std::env::var("SHORTS_VIDEO_CODEC")
                .unwrap_or_else(|_| defaults.transform.encoding.codec.clone()),
            audio_codec: std::env::var("SHORTS_AUDIO_CODEC")
                .unwrap_or_else(|_| defaults.transform.encoding.audio_codec.clone()),
            preset: std::env::var("SHORTS_PRESET")
                .unwrap_or_else(|_| defaults.transform.encoding.preset.clone()),
            threads: std::env::var("SHORTS_THREADS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.transform.encoding.threads)
                .max(1),
            extra_args: Vec::new(),
        };

        let transform = TransformSpec::new(
            std::env::var("SHORTS_MAX_DURATION_SECS")
                .ok()
                .and_then(|s| parse_max_duration(&s))
                .unwrap_or(defaults.transform.max_duration_secs),
            std::env::var("SHORTS_TARGET_ASPECT")
                .ok()
                .and_then(|s| s.parse::<AspectRatio>().ok())
                .unwrap_or(defaults.transform.target_aspect),
        )
        .with_encoding(encoding);

        Self {
            intake_dir: std::env::var("SHORTS_INTAKE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.intake_dir),
            processed_dir: std::env::var("SHORTS_PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.processed_dir),
            session_path: std::env::var("SHORTS_SESSION_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_path),
            transform,
            upload_chunk_bytes: std::env::var("SHORTS_UPLOAD_CHUNK_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.upload_chunk_bytes),
            max_concurrent_jobs: std::env::var("SHORTS_MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            stage_timeout: Duration::from_secs(
                std::env::var("SHORTS_STAGE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            http_timeout: Duration::from_secs(
                std::env::var("SHORTS_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            job_retention: Duration::from_secs(
                std::env::var("SHORTS_JOB_RETENTION_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            consent_timeout: Duration::from_secs(
                std::env::var("SHORTS_CONSENT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            ffmpeg_path: std::env::var("FFMPEG_PATH").ok().map(PathBuf::from),
            ffprobe_path: std::env::var("FFPROBE_PATH").ok().map(PathBuf::from),
        }
    }

    /// Root every directory under `root`; used by tests and local runs.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            intake_dir: root.join("uploads"),
            processed_dir: root.join("processed"),
            session_path: root.join("session.json"),
            ..Self::default()
        }
    }
}

/// Positive, finite seconds; anything else falls back to the default.
fn parse_max_duration(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs > 0.0)
}
