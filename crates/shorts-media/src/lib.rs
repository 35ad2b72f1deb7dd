//! Media stages for the shorts pipeline.
//!
//! This crate provides:
//! - Source acquisition through yt-dlp or plain HTTP streaming
//! - Type-safe FFmpeg command building with kill-on-drop children
//! - FFprobe inspection and pure crop planning
//! - The shorts transformer (trim + crop + re-encode)
//! - Sanitised intake of uploaded files

pub mod command;
pub mod crop;
pub mod error;
pub mod fetch;
pub mod fs_utils;
pub mod intake;
pub mod probe;
pub mod progress;
pub mod transform;

pub use command::{FfmpegCommand, FfmpegRunner};
pub use crop::{plan_crop, CropRect};
pub use error::{
    FetchError, FetchResult, IntakeError, IntakeResult, MediaError, MediaResult, TransformError,
    TransformResult,
};
pub use fetch::{parse_source, select_progressive_stream, Fetcher, StreamFormat};
pub use intake::{sanitize_filename, store_upload, UploadWriter};
pub use probe::{probe_video, probe_video_with, VideoInfo};
pub use progress::{NoopProgress, ProgressSink, RecordingProgress, StageProgress};
pub use transform::{RenderPlan, Transformer};
