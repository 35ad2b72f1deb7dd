//! Shorts transformer: trim to a maximum duration, crop to the target
//! aspect ratio, and re-encode.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use shorts_models::{EncodingProfile, MediaAsset, TransformSpec};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::crop::{plan_crop, CropRect};
use crate::error::{MediaError, TransformError, TransformResult};
use crate::fs_utils::{ensure_dir, file_size};
use crate::probe::{probe_video, probe_video_with, VideoInfo};
use crate::progress::{ProgressSink, StageProgress};

/// Prefix of every transformer output file.
pub const OUTPUT_PREFIX: &str = "shorts_";

/// Decisions taken for one source before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    /// Hard cut point, if the source is longer than allowed
    pub cut_at: Option<f64>,
    pub crop: Option<CropRect>,
}

impl RenderPlan {
    /// Plan the trim and crop for a probed source.
    pub fn for_source(info: &VideoInfo, spec: &TransformSpec) -> TransformResult<Self> {
        let cut_at = (info.duration > spec.max_duration_secs).then_some(spec.max_duration_secs);
        let crop = plan_crop(info.width, info.height, spec.target_ratio())?;
        Ok(Self { cut_at, crop })
    }

    /// Build the FFmpeg invocation for this plan.
    pub fn to_command(
        &self,
        input: &Path,
        output: &Path,
        encoding: &EncodingProfile,
    ) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(input, output);
        if let Some(crop) = &self.crop {
            cmd = cmd.video_filter(crop.to_filter());
        }
        if let Some(cut_at) = self.cut_at {
            cmd = cmd.max_duration(cut_at);
        }
        cmd.output_args(encoding.to_ffmpeg_args())
    }
}

/// Renders processed shorts into the processed directory.
#[derive(Debug, Clone)]
pub struct Transformer {
    processed_dir: PathBuf,
    timeout: Option<Duration>,
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
}

impl Transformer {
    pub fn new(processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            processed_dir: processed_dir.into(),
            timeout: None,
            ffmpeg: None,
            ffprobe: None,
        }
    }

    /// Limit the encoder's wall-clock time.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use these binaries instead of looking up `ffmpeg` / `ffprobe` in PATH.
    pub fn with_tools(mut self, ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg;
        self.ffprobe = ffprobe;
        self
    }

    /// Output path for a source: `<processed_dir>/shorts_<file name>`.
    pub fn output_path_for(&self, source: &Path) -> TransformResult<PathBuf> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransformError::decode(format!("{} has no file name", source.display())))?;
        Ok(self.processed_dir.join(format!("{}{}", OUTPUT_PREFIX, name)))
    }

    /// Transform `asset` according to `spec`.
    ///
    /// The source file is never modified. On failure `0 "Error: ..."` is
    /// emitted, the encoder is killed, and no output file remains.
    pub async fn transform(
        &self,
        asset: &MediaAsset,
        spec: &TransformSpec,
        progress: &dyn ProgressSink,
    ) -> TransformResult<MediaAsset> {
        self.transform_with_cancel(asset, spec, progress, None).await
    }

    /// Like [`transform`](Self::transform); the encoder is killed as soon as
    /// `cancel` flips to `true`.
    pub async fn transform_with_cancel(
        &self,
        asset: &MediaAsset,
        spec: &TransformSpec,
        progress: &dyn ProgressSink,
        cancel: Option<watch::Receiver<bool>>,
    ) -> TransformResult<MediaAsset> {
        let stage = StageProgress::new(progress);
        match self.transform_inner(asset, spec, &stage, cancel).await {
            Ok(output) => {
                info!(
                    source = %asset.path.display(),
                    output = %output.path.display(),
                    size_mb = %format!("{:.2}", output.size_mb()),
                    "Conversion complete"
                );
                stage.complete("Conversion complete!");
                Ok(output)
            }
            Err(e) => {
                warn!(source = %asset.path.display(), kind = e.kind(), "Conversion failed: {}", e);
                stage.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn transform_inner(
        &self,
        asset: &MediaAsset,
        spec: &TransformSpec,
        stage: &StageProgress<'_>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> TransformResult<MediaAsset> {
        stage.report(10, "Loading video...");
        spec.validate()?;
        let info = match &self.ffprobe {
            Some(program) => probe_video_with(program, &asset.path).await,
            None => probe_video(&asset.path).await,
        }
        .map_err(decode_error)?;
        if info.width == 0 || info.height == 0 {
            return Err(TransformError::decode("video stream has no dimensions"));
        }
        debug!(
            width = info.width,
            height = info.height,
            duration = info.duration,
            codec = %info.codec,
            container = %info.container,
            "Probed source"
        );

        stage.report(30, "Checking duration...");
        if info.duration > spec.max_duration_secs {
            info!(
                "Trimming from {:.2}s to {:.2}s",
                info.duration, spec.max_duration_secs
            );
        }

        stage.report(50, "Checking aspect ratio...");
        let plan = RenderPlan::for_source(&info, spec)?;
        if let Some(rect) = &plan.crop {
            info!(
                "Cropping {}x{} (ratio {:.3}) to {} for target {}",
                info.width,
                info.height,
                info.aspect_ratio(),
                rect,
                spec.target_aspect
            );
        }

        stage.report(70, "Rendering video...");
        let target = self.output_path_for(&asset.path)?;
        ensure_dir(&self.processed_dir).await?;

        // Rendered next to the target so the final rename stays on one filesystem.
        let ext = target
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_else(|| ".mp4".to_string());
        let scratch = tempfile::Builder::new()
            .prefix(".render-")
            .suffix(&ext)
            .tempfile_in(&self.processed_dir)?;

        let cmd = plan.to_command(&asset.path, scratch.path(), &spec.encoding);
        let mut runner = FfmpegRunner::new();
        if let Some(program) = &self.ffmpeg {
            runner = runner.with_program(program);
        }
        if let Some(timeout) = self.timeout {
            runner = runner.with_timeout(timeout);
        }
        if let Some(cancel) = cancel {
            runner = runner.with_cancel(cancel);
        }
        runner.run(&cmd).await.map_err(TransformError::Encode)?;

        let size = file_size(scratch.path()).await?;
        if size == 0 {
            return Err(TransformError::Encode(MediaError::ffmpeg_failed(
                "FFmpeg produced an empty file",
                None,
                None,
            )));
        }
        scratch.persist(&target).map_err(|e| TransformError::Disk(e.error))?;

        Ok(MediaAsset::new(target, size))
    }
}

fn decode_error(e: MediaError) -> TransformError {
    TransformError::decode(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingProgress;
    use shorts_models::AspectRatio;
    use tempfile::TempDir;

    fn info(width: u32, height: u32, duration: f64) -> VideoInfo {
        VideoInfo {
            duration,
            width,
            height,
            fps: 30.0,
            codec: "h264".to_string(),
            container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            has_audio: true,
            size: 0,
        }
    }

    #[test]
    fn test_plan_landscape_ninety_seconds() {
        let spec = TransformSpec::new(60.0, AspectRatio::PORTRAIT);
        let plan = RenderPlan::for_source(&info(1920, 1080, 90.0), &spec).unwrap();
        assert_eq!(plan.cut_at, Some(60.0));
        assert_eq!(
            plan.crop,
            Some(CropRect { width: 608, height: 1080, x: 656, y: 0 })
        );
    }

    #[test]
    fn test_plan_short_portrait_source_untouched() {
        let spec = TransformSpec::default();
        let plan = RenderPlan::for_source(&info(1080, 1920, 30.0), &spec).unwrap();
        assert_eq!(plan, RenderPlan { cut_at: None, crop: None });
    }

    #[test]
    fn test_plan_to_command() {
        let spec = TransformSpec::default();
        let plan = RenderPlan::for_source(&info(1920, 1080, 90.0), &spec).unwrap();
        let args = plan
            .to_command(Path::new("in.mp4"), Path::new("out.mp4"), &spec.encoding)
            .build_args()
            .join(" ");
        assert!(args.contains("-vf crop=608:1080:656:0"));
        assert!(args.contains("-t 60.000"));
        assert!(args.contains("-c:v libx264 -preset fast -threads 4 -c:a aac"));
        assert!(args.ends_with("out.mp4"));
    }

    #[test]
    fn test_output_path_prefix() {
        let transformer = Transformer::new("processed");
        let out = transformer
            .output_path_for(Path::new("uploads/video_1.mp4"))
            .unwrap();
        assert_eq!(out, Path::new("processed/shorts_video_1.mp4"));
    }

    #[tokio::test]
    async fn test_invalid_spec_fails_before_probing() {
        let tmp = TempDir::new().unwrap();
        let transformer = Transformer::new(tmp.path().join("processed"));
        let asset = MediaAsset::new(tmp.path().join("missing.mp4"), 0);
        let spec = TransformSpec::new(0.0, AspectRatio::PORTRAIT);
        let progress = RecordingProgress::new();

        let err = transformer.transform(&asset, &spec, &progress).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_spec");
        assert_eq!(progress.percents(), vec![10, 0]);
        assert!(progress.last().unwrap().is_failure());
    }

    #[tokio::test]
    async fn test_missing_source_is_decode_error() {
        let tmp = TempDir::new().unwrap();
        let transformer = Transformer::new(tmp.path().join("processed"));
        let asset = MediaAsset::new(tmp.path().join("missing.mp4"), 0);
        let progress = RecordingProgress::new();

        let err = transformer
            .transform(&asset, &TransformSpec::default(), &progress)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "decode");
        assert!(!tmp.path().join("processed").exists());
    }

    #[cfg(unix)]
    fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// ffprobe stand-in reporting a 1920x1080, 90 second source.
    #[cfg(unix)]
    const LANDSCAPE_PROBE: &str = r#"cat <<'JSON'
{"format": {"duration": "90.0", "size": "3", "format_name": "mov,mp4,m4a,3gp,3g2,mj2"},
 "streams": [{"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "r_frame_rate": "30/1"}]}
JSON"#;

    /// Writes a partial file to the output path (the last argument) first.
    #[cfg(unix)]
    const PARTIAL_WRITE: &str = r#"for last; do :; done
echo partial > "$last""#;

    #[cfg(unix)]
    fn encoder_rig(tmp: &TempDir, encoder_tail: &str) -> (Transformer, MediaAsset) {
        let bin = tmp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let ffprobe = fake_tool(&bin, "ffprobe", LANDSCAPE_PROBE);
        let ffmpeg = fake_tool(&bin, "ffmpeg", &format!("{}\n{}", PARTIAL_WRITE, encoder_tail));

        let source = tmp.path().join("source.mp4");
        std::fs::write(&source, b"src").unwrap();
        let transformer = Transformer::new(tmp.path().join("processed"))
            .with_tools(Some(ffmpeg), Some(ffprobe));
        (transformer, MediaAsset::new(source, 3))
    }

    #[cfg(unix)]
    fn processed_entries(tmp: &TempDir) -> usize {
        std::fs::read_dir(tmp.path().join("processed")).unwrap().count()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_render_is_persisted() {
        let tmp = TempDir::new().unwrap();
        let (transformer, asset) = encoder_rig(&tmp, "exit 0");
        let progress = RecordingProgress::new();

        let output = transformer
            .transform(&asset, &TransformSpec::default(), &progress)
            .await
            .unwrap();

        assert_eq!(output.path, tmp.path().join("processed/shorts_source.mp4"));
        assert_eq!(std::fs::read(&output.path).unwrap(), b"partial\n");
        assert_eq!(processed_entries(&tmp), 1);
        assert_eq!(progress.percents(), vec![10, 30, 50, 70, 100]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encoder_failure_leaves_no_output() {
        let tmp = TempDir::new().unwrap();
        let (transformer, asset) = encoder_rig(&tmp, "echo 'broken pipe' >&2\nexit 1");
        let progress = RecordingProgress::new();

        let err = transformer
            .transform(&asset, &TransformSpec::default(), &progress)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransformError::Encode(MediaError::FfmpegFailed { exit_code: Some(1), .. })
        ));
        assert_eq!(processed_entries(&tmp), 0);
        assert!(asset.path.exists());
        let last = progress.last().unwrap();
        assert_eq!(last.percent, 0);
        assert!(last.is_failure());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encoder_timeout_leaves_no_output() {
        let tmp = TempDir::new().unwrap();
        let (transformer, asset) = encoder_rig(&tmp, "exec sleep 30");
        let transformer = transformer.with_timeout(Duration::from_millis(300));
        let progress = RecordingProgress::new();

        let err = transformer
            .transform(&asset, &TransformSpec::default(), &progress)
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::Encode(MediaError::Timeout(_))));
        assert_eq!(processed_entries(&tmp), 0);
        assert!(progress.last().unwrap().is_failure());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_encoder_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let (transformer, asset) = encoder_rig(&tmp, "exec sleep 30");
        let progress = RecordingProgress::new();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = cancel_tx.send(true);
        });

        let started = std::time::Instant::now();
        let err = transformer
            .transform_with_cancel(&asset, &TransformSpec::default(), &progress, Some(cancel_rx))
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::Encode(MediaError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(processed_entries(&tmp), 0);
        let last = progress.last().unwrap();
        assert_eq!(last.percent, 0);
        assert!(last.is_failure());
    }
}
