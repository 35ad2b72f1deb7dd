//! Source acquisition.
//!
//! Platform URLs (YouTube) are resolved through yt-dlp: the format list is
//! dumped as JSON, the best progressive MP4 stream is chosen locally, and
//! exactly that format is downloaded. Any other http(s) URL is streamed with
//! reqwest. Both paths write into a hidden temporary location inside the
//! intake directory and only rename the finished file into place.

use futures_util::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use shorts_models::{MediaAsset, SourceKind};

use crate::command::{cancelled, check_ytdlp, run_tool, stderr_tail};
use crate::error::{FetchError, FetchResult, MediaError};
use crate::fs_utils::{ensure_dir, file_size, unique_name};
use crate::progress::{ProgressSink, StageProgress};

/// Container extension used when nothing better is known.
const DEFAULT_EXTENSION: &str = "mp4";

/// Percent band used for proportional download progress.
const DOWNLOAD_BAND: (u8, u8) = (30, 95);

/// One entry of yt-dlp's format list.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Total bitrate in kbit/s
    pub tbr: Option<f64>,
}

impl StreamFormat {
    /// Audio and video muxed together in an MP4 container.
    pub fn is_progressive_mp4(&self) -> bool {
        let present = |codec: &Option<String>| {
            codec
                .as_deref()
                .map(|c| !c.is_empty() && c != "none")
                .unwrap_or(false)
        };
        self.ext == "mp4" && present(&self.vcodec) && present(&self.acodec)
    }
}

#[derive(Debug, Deserialize)]
struct PlatformInfo {
    id: String,
    #[serde(default)]
    formats: Vec<StreamFormat>,
}

/// Pick the highest-resolution progressive MP4 stream.
///
/// Ties on height are broken by width, then by bitrate.
pub fn select_progressive_stream(formats: &[StreamFormat]) -> Option<&StreamFormat> {
    formats
        .iter()
        .filter(|f| f.is_progressive_mp4())
        .max_by(|a, b| {
            (a.height.unwrap_or(0), a.width.unwrap_or(0))
                .cmp(&(b.height.unwrap_or(0), b.width.unwrap_or(0)))
                .then_with(|| {
                    a.tbr
                        .unwrap_or(0.0)
                        .partial_cmp(&b.tbr.unwrap_or(0.0))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        })
}

/// Validate a source string as an absolute http(s) URL.
pub fn parse_source(source: &str) -> FetchResult<Url> {
    let source = source.trim();
    if source.is_empty() {
        return Err(FetchError::invalid_url("URL is required"));
    }
    let url = Url::parse(source).map_err(|e| FetchError::invalid_url(format!("{}: {}", source, e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(FetchError::invalid_url(format!(
                "unsupported scheme '{}', only http and https are allowed",
                other
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(FetchError::invalid_url(format!("{} has no host", source)));
    }
    Ok(url)
}

/// Downloads source videos into the intake directory.
#[derive(Debug, Clone)]
pub struct Fetcher {
    intake_dir: PathBuf,
    client: reqwest::Client,
    tool_timeout: Duration,
}

impl Fetcher {
    pub fn new(
        intake_dir: impl Into<PathBuf>,
        http_timeout: Duration,
        tool_timeout: Duration,
    ) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .user_agent(concat!("shorts-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(intake_dir, client, tool_timeout))
    }

    pub fn with_client(
        intake_dir: impl Into<PathBuf>,
        client: reqwest::Client,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            intake_dir: intake_dir.into(),
            client,
            tool_timeout,
        }
    }

    /// Fetch `source` into a new, uniquely named asset.
    ///
    /// Emits `0 "Error: ..."` and returns the error on failure; no partial
    /// file is left behind.
    pub async fn fetch(&self, source: &str, progress: &dyn ProgressSink) -> FetchResult<MediaAsset> {
        self.fetch_with_cancel(source, progress, None).await
    }

    /// Like [`fetch`](Self::fetch); abandons the download as soon as
    /// `cancel` flips to `true`.
    ///
    /// Dropping the in-flight download kills yt-dlp and removes the
    /// temporary file.
    pub async fn fetch_with_cancel(
        &self,
        source: &str,
        progress: &dyn ProgressSink,
        cancel: Option<watch::Receiver<bool>>,
    ) -> FetchResult<MediaAsset> {
        let stage = StageProgress::new(progress);
        let result = tokio::select! {
            result = self.fetch_inner(source, &stage) => result,
            _ = cancelled(cancel) => Err(MediaError::Cancelled.into()),
        };
        match result {
            Ok(asset) => {
                info!(
                    path = %asset.path.display(),
                    size_mb = %format!("{:.2}", asset.size_mb()),
                    "Download complete"
                );
                stage.complete("Download complete!");
                Ok(asset)
            }
            Err(e) => {
                warn!(url = %source, kind = e.kind(), "Download failed: {}", e);
                stage.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn fetch_inner(&self, source: &str, stage: &StageProgress<'_>) -> FetchResult<MediaAsset> {
        let url = parse_source(source)?;
        stage.report(10, "Starting download...");
        ensure_dir(&self.intake_dir).await?;

        match SourceKind::classify(&url) {
            SourceKind::Platform => self.fetch_platform(&url, stage).await,
            SourceKind::Generic => self.fetch_generic(&url, stage).await,
        }
    }

    async fn fetch_platform(&self, url: &Url, stage: &StageProgress<'_>) -> FetchResult<MediaAsset> {
        check_ytdlp()?;

        let info = self.list_formats(url).await?;
        let format = select_progressive_stream(&info.formats)
            .ok_or_else(|| FetchError::NoStreamAvailable(url.to_string()))?;
        debug!(
            format_id = %format.format_id,
            height = format.height.unwrap_or(0),
            "Selected progressive stream"
        );

        stage.report(30, "Downloading video...");

        let work_dir = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempdir_in(&self.intake_dir)?;
        let partial = work_dir.path().join(format!("download.{}", DEFAULT_EXTENSION));

        let args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "-f".to_string(),
            format.format_id.clone(),
            "-o".to_string(),
            partial.to_string_lossy().to_string(),
            url.to_string(),
        ];
        let output = run_tool("yt-dlp", &args, self.tool_timeout).await?;
        if !output.status.success() {
            return Err(MediaError::tool_failed(
                format!("download of format {} failed", format.format_id),
                Some(stderr_tail(&output.stderr)),
            )
            .into());
        }
        if !tokio::fs::try_exists(&partial).await.unwrap_or(false) {
            return Err(MediaError::tool_failed("yt-dlp produced no output file", None).into());
        }

        let prefix = platform_prefix(&info.id);
        let target = self.intake_dir.join(unique_name(&prefix, DEFAULT_EXTENSION));
        tokio::fs::rename(&partial, &target).await?;
        let size = file_size(&target).await?;

        Ok(MediaAsset::new(target, size))
    }

    async fn list_formats(&self, url: &Url) -> FetchResult<PlatformInfo> {
        let args = vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ];
        let output = run_tool("yt-dlp", &args, self.tool_timeout).await?;
        if !output.status.success() {
            return Err(MediaError::tool_failed(
                "could not list formats",
                Some(stderr_tail(&output.stderr)),
            )
            .into());
        }
        let info: PlatformInfo =
            serde_json::from_slice(&output.stdout).map_err(MediaError::from)?;
        Ok(info)
    }

    async fn fetch_generic(&self, url: &Url, stage: &StageProgress<'_>) -> FetchResult<MediaAsset> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::network(format!("HTTP {} from {}", status.as_u16(), url)));
        }
        let total = response.content_length().filter(|len| *len > 0);

        stage.report(30, "Downloading video...");

        let part = tempfile::Builder::new()
            .prefix(".fetch-")
            .suffix(".part")
            .tempfile_in(&self.intake_dir)?;
        let mut file = tokio::fs::File::from_std(part.as_file().try_clone()?);

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(total) = total {
                stage.advance(band_percent(downloaded, total), "Downloading video...");
            }
        }
        file.flush().await?;
        drop(file);

        if downloaded == 0 {
            return Err(FetchError::network(format!("empty response body from {}", url)));
        }

        let target = self
            .intake_dir
            .join(unique_name("video", &extension_from_url(url)));
        part.persist_noclobber(&target).map_err(|e| FetchError::Disk(e.error))?;

        Ok(MediaAsset::new(target, downloaded))
    }
}

/// Map downloaded/total onto the downloading band.
fn band_percent(downloaded: u64, total: u64) -> u8 {
    let (low, high) = DOWNLOAD_BAND;
    let fraction = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
    low + (fraction * (high - low) as f64).floor() as u8
}

/// File extension from the URL path, falling back to mp4.
fn extension_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .and_then(|last| last.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// File-name-safe prefix from a platform video id.
fn platform_prefix(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingProgress;
    use std::path::Path;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn format(id: &str, ext: &str, v: &str, a: &str, h: u32, w: u32, tbr: f64) -> StreamFormat {
        StreamFormat {
            format_id: id.to_string(),
            ext: ext.to_string(),
            vcodec: Some(v.to_string()),
            acodec: Some(a.to_string()),
            width: Some(w),
            height: Some(h),
            tbr: Some(tbr),
        }
    }

    fn fetcher(dir: &Path) -> Fetcher {
        Fetcher::new(dir, Duration::from_secs(10), Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_select_highest_progressive() {
        let formats = vec![
            format("18", "mp4", "avc1", "mp4a", 360, 640, 500.0),
            format("22", "mp4", "avc1", "mp4a", 720, 1280, 1500.0),
            format("137", "mp4", "avc1", "none", 1080, 1920, 4000.0),
            format("248", "webm", "vp9", "opus", 1080, 1920, 3000.0),
        ];
        assert_eq!(select_progressive_stream(&formats).unwrap().format_id, "22");
    }

    #[test]
    fn test_select_breaks_ties_by_bitrate() {
        let formats = vec![
            format("a", "mp4", "avc1", "mp4a", 720, 1280, 900.0),
            format("b", "mp4", "avc1", "mp4a", 720, 1280, 1800.0),
        ];
        assert_eq!(select_progressive_stream(&formats).unwrap().format_id, "b");
    }

    #[test]
    fn test_select_none_when_only_adaptive() {
        let formats = vec![
            format("137", "mp4", "avc1", "none", 1080, 1920, 4000.0),
            format("140", "m4a", "none", "mp4a", 0, 0, 128.0),
        ];
        assert!(select_progressive_stream(&formats).is_none());
        assert!(select_progressive_stream(&[]).is_none());
    }

    #[test]
    fn test_parse_source() {
        assert!(parse_source("https://example.com/v.mp4").is_ok());
        assert!(matches!(parse_source(""), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(parse_source("not a url"), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(parse_source("file:///etc/passwd"), Err(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn test_extension_from_url() {
        let ext = |s: &str| extension_from_url(&Url::parse(s).unwrap());
        assert_eq!(ext("https://cdn.test/a/clip.MOV"), "mov");
        assert_eq!(ext("https://cdn.test/a/clip"), "mp4");
        assert_eq!(ext("https://cdn.test/watch.php?id=1"), "php");
        assert_eq!(ext("https://cdn.test/"), "mp4");
    }

    #[test]
    fn test_band_percent() {
        assert_eq!(band_percent(0, 100), 30);
        assert_eq!(band_percent(50, 100), 62);
        assert_eq!(band_percent(100, 100), 95);
        assert_eq!(band_percent(200, 100), 95);
    }

    #[test]
    fn test_platform_prefix() {
        assert_eq!(platform_prefix("dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(platform_prefix("../../x"), "x");
        assert_eq!(platform_prefix("///"), "video");
    }

    #[tokio::test]
    async fn test_generic_fetch_streams_to_unique_file() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/media/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let fetcher = fetcher(tmp.path());
        let progress = RecordingProgress::new();
        let url = format!("{}/media/clip.mp4", server.uri());

        let asset = fetcher.fetch(&url, &progress).await.unwrap();
        assert_eq!(asset.size_bytes, body.len() as u64);
        assert_eq!(asset.container, "mp4");
        assert_eq!(tokio::fs::read(&asset.path).await.unwrap(), body);

        let percents = progress.percents();
        assert_eq!(percents.first(), Some(&10));
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_get_distinct_paths() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let fetcher = fetcher(tmp.path());
        let url = format!("{}/v.mp4", server.uri());
        let noop = crate::progress::NoopProgress;

        let (a, b) = tokio::join!(fetcher.fetch(&url, &noop), fetcher.fetch(&url, &noop));
        assert_ne!(a.unwrap().path, b.unwrap().path);
    }

    #[tokio::test]
    async fn test_http_error_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let fetcher = fetcher(tmp.path());
        let progress = RecordingProgress::new();

        let err = fetcher
            .fetch(&format!("{}/missing.mp4", server.uri()), &progress)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "network");

        let last = progress.last().unwrap();
        assert_eq!(last.percent, 0);
        assert!(last.message.starts_with("Error:"));

        let mut entries = tokio::fs::read_dir(tmp.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_url_reports_error() {
        let tmp = TempDir::new().unwrap();
        let progress = RecordingProgress::new();
        let err = fetcher(tmp.path())
            .fetch("ftp://example.com/v.mp4", &progress)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_url");
        assert_eq!(progress.percents(), vec![0]);
    }

    #[tokio::test]
    async fn test_cancel_abandons_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let progress = RecordingProgress::new();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = cancel_tx.send(true);
        });

        let err = fetcher(tmp.path())
            .fetch_with_cancel(&format!("{}/slow.mp4", server.uri()), &progress, Some(cancel_rx))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Tool(MediaError::Cancelled)));
        assert!(progress.last().unwrap().is_failure());

        let mut entries = tokio::fs::read_dir(tmp.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
