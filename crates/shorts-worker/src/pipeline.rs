//! Pipeline context and trigger interface.
//!
//! A [`Pipeline`] owns the stage components built from one
//! [`PipelineConfig`] and turns trigger calls into runner jobs. Triggers
//! validate their input synchronously and return a [`JobHandle`] without
//! waiting for the stage; `start_authenticate` is the one exception and
//! completes before returning.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use shorts_media::{parse_source, Fetcher, Transformer, UploadWriter};
use shorts_models::{JobOutcome, MediaAsset, StageKind, UploadMetadata};
use shorts_publish::{
    Authenticator, ConsentFlow, LoopbackConsent, PublishError, Publisher, Session, SessionStore,
    UploadTransport, YouTubeTransport,
};

use crate::config::PipelineConfig;
use crate::error::{StageError, TriggerError, TriggerResult};
use crate::progress::ProgressHub;
use crate::runner::{JobHandle, JobRunner, RunnerConfig};

pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Fetcher,
    transformer: Transformer,
    authenticator: Arc<Authenticator>,
    publisher: Publisher,
    runner: JobRunner,
}

impl Pipeline {
    /// Build the production pipeline: loopback consent and the YouTube upload API.
    pub async fn new(config: PipelineConfig) -> TriggerResult<Self> {
        let http = build_http_client(&config)?;
        let consent: Arc<dyn ConsentFlow> = Arc::new(LoopbackConsent::new(config.consent_timeout));
        let transport: Arc<dyn UploadTransport> = Arc::new(YouTubeTransport::new(http.clone()));
        Self::with_components(config, consent, transport, http).await
    }

    /// Build a pipeline around the given consent flow and upload transport.
    ///
    /// Creates the intake and processed directories and the session file's
    /// parent directory.
    pub async fn with_components(
        config: PipelineConfig,
        consent: Arc<dyn ConsentFlow>,
        transport: Arc<dyn UploadTransport>,
        http: reqwest::Client,
    ) -> TriggerResult<Self> {
        tokio::fs::create_dir_all(&config.intake_dir).await?;
        tokio::fs::create_dir_all(&config.processed_dir).await?;
        if let Some(parent) = config.session_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let fetcher = Fetcher::with_client(&config.intake_dir, http.clone(), config.stage_timeout);
        let transformer = Transformer::new(&config.processed_dir)
            .with_timeout(config.stage_timeout)
            .with_tools(config.ffmpeg_path.clone(), config.ffprobe_path.clone());
        let authenticator = Arc::new(Authenticator::new(
            SessionStore::new(&config.session_path),
            consent,
            http,
        ));
        let publisher = Publisher::new(transport, config.upload_chunk_bytes);
        let runner = JobRunner::new(RunnerConfig::from(&config), Arc::new(ProgressHub::default()));

        info!(
            intake_dir = %config.intake_dir.display(),
            processed_dir = %config.processed_dir.display(),
            max_concurrent_jobs = config.max_concurrent_jobs,
            "Pipeline ready"
        );

        Ok(Self {
            config,
            fetcher,
            transformer,
            authenticator,
            publisher,
            runner,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn hub(&self) -> &Arc<ProgressHub> {
        self.runner.hub()
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.authenticator
    }

    /// Download `url` into the intake directory.
    pub fn start_fetch(&self, url: &str) -> TriggerResult<JobHandle> {
        let url = url.trim();
        if url.is_empty() {
            return Err(TriggerError::MissingField("url"));
        }
        parse_source(url).map_err(|e| TriggerError::invalid_url(e.to_string()))?;

        let fetcher = self.fetcher.clone();
        let url = url.to_string();
        Ok(self.runner.dispatch(StageKind::Fetch, move |ctx| async move {
            let asset = fetcher
                .fetch_with_cancel(&url, ctx.progress(), Some(ctx.cancel_signal()))
                .await?;
            Ok(JobOutcome::Asset(asset))
        }))
    }

    /// Trim and crop a local video into the processed directory.
    pub async fn start_transform(&self, local_path: &str) -> TriggerResult<JobHandle> {
        let asset = existing_asset(local_path, "video_path").await?;

        let transformer = self.transformer.clone();
        let spec = self.config.transform.clone();
        Ok(self.runner.dispatch(StageKind::Transform, move |ctx| async move {
            let output = transformer
                .transform_with_cancel(&asset, &spec, ctx.progress(), Some(ctx.cancel_signal()))
                .await?;
            Ok(JobOutcome::Asset(output))
        }))
    }

    /// Authenticate with a client-secrets blob. Completes before returning.
    pub async fn start_authenticate(&self, credentials_blob: &str) -> TriggerResult<Session> {
        if credentials_blob.trim().is_empty() {
            return Err(TriggerError::MissingField("credentials"));
        }
        Ok(self.authenticator.authenticate(credentials_blob).await?)
    }

    /// Upload a local video with `metadata` using the persisted session.
    pub async fn start_publish(
        &self,
        local_path: &str,
        metadata: UploadMetadata,
    ) -> TriggerResult<JobHandle> {
        let asset = existing_asset(local_path, "video_path").await?;
        metadata
            .check()
            .map_err(|e| TriggerError::invalid_metadata(e.to_string()))?;

        let session = self
            .authenticator
            .current_session()
            .await?
            .filter(|s| s.is_valid() || s.can_refresh())
            .ok_or(TriggerError::NotAuthenticated)?;

        let authenticator = Arc::clone(&self.authenticator);
        let publisher = self.publisher.clone();
        Ok(self.runner.dispatch(StageKind::Publish, move |ctx| async move {
            let session = authenticator.fresh_session(&session).await?;
            let result = publisher
                .publish_with_cancel(
                    &asset,
                    &metadata,
                    &session,
                    ctx.progress(),
                    Some(ctx.cancel_signal()),
                )
                .await;

            match result {
                Ok(video_id) => Ok(JobOutcome::Published { video_id }),
                Err(e @ PublishError::SessionRejected(_)) => {
                    ctx.logger().log_warning("Platform rejected the session, dropping it");
                    if let Err(forget_err) = authenticator.forget().await {
                        warn!("Failed to clear rejected session: {}", forget_err);
                    }
                    Err(StageError::from(e))
                }
                Err(e) => Err(StageError::from(e)),
            }
        }))
    }

    /// Open an incremental upload into the intake directory.
    pub async fn begin_upload(&self, file_name: &str) -> TriggerResult<UploadWriter> {
        if file_name.trim().is_empty() {
            return Err(TriggerError::MissingField("file"));
        }
        Ok(UploadWriter::create(&self.config.intake_dir, file_name).await?)
    }

    /// Stop accepting work and signal running stages.
    pub fn shutdown(&self) {
        self.runner.shutdown();
    }
}

fn build_http_client(config: &PipelineConfig) -> TriggerResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .user_agent(concat!("shorts-pipeline/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TriggerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
}

/// Resolve a caller-supplied path to a non-empty regular file.
async fn existing_asset(local_path: &str, field: &'static str) -> TriggerResult<MediaAsset> {
    let trimmed = local_path.trim();
    if trimmed.is_empty() {
        return Err(TriggerError::MissingField(field));
    }
    let path = PathBuf::from(trimmed);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(MediaAsset::new(path, meta.len())),
        _ => Err(TriggerError::FileNotFound(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use shorts_models::{JobState, RemoteVideoId};
    use shorts_publish::{AuthError, AuthResult, ClientSecrets, ConsentGrant};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Consent that always fails; tests never reach it.
    struct NeverConsent;

    #[async_trait]
    impl ConsentFlow for NeverConsent {
        async fn obtain_code(
            &self,
            _secrets: &ClientSecrets,
            _scopes: &[&str],
        ) -> AuthResult<ConsentGrant> {
            Err(AuthError::consent_denied("no browser in tests"))
        }
    }

    async fn pipeline(tmp: &TempDir, api_base: &str) -> Pipeline {
        let http = reqwest::Client::new();
        Pipeline::with_components(
            PipelineConfig::rooted_at(tmp.path()),
            Arc::new(NeverConsent),
            Arc::new(YouTubeTransport::with_base_url(http.clone(), api_base)),
            http,
        )
        .await
        .unwrap()
    }

    fn valid_session() -> Session {
        Session {
            access_token: "tok".to_string(),
            refresh_token: Some("1//r".to_string()),
            expires_at: Utc::now() + ChronoDuration::hours(1),
            scopes: vec![],
            token_uri: "http://127.0.0.1:1/token".to_string(),
            client_id: "cid".to_string(),
            client_secret: None,
        }
    }

    fn write_video(tmp: &TempDir, name: &str) -> String {
        let path = tmp.path().join(name);
        std::fs::write(&path, b"not really a video").unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_bootstrap_creates_directories() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp, "http://127.0.0.1:1").await;
        assert!(pipeline.config().intake_dir.is_dir());
        assert!(pipeline.config().processed_dir.is_dir());
    }

    #[tokio::test]
    async fn test_fetch_preflight() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp, "http://127.0.0.1:1").await;

        assert!(matches!(
            pipeline.start_fetch("  "),
            Err(TriggerError::MissingField("url"))
        ));
        assert!(matches!(
            pipeline.start_fetch("ftp://example.com/a.mp4"),
            Err(TriggerError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_job_downloads_into_intake() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp, "http://127.0.0.1:1").await;
        let handle = pipeline
            .start_fetch(&format!("{}/clip.mp4", server.uri()))
            .unwrap();

        let done = handle.wait().await;
        assert_eq!(done.state, JobState::Succeeded, "{:?}", done.failure);
        let asset = done.outcome.unwrap().asset().cloned().unwrap();
        assert!(asset.path.starts_with(&pipeline.config().intake_dir));
        assert_eq!(asset.size_bytes, 4096);
        assert_eq!(done.progress.percent, 100);
    }

    #[tokio::test]
    async fn test_transform_requires_existing_file() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp, "http://127.0.0.1:1").await;

        assert!(matches!(
            pipeline.start_transform("").await,
            Err(TriggerError::MissingField("video_path"))
        ));
        assert!(matches!(
            pipeline.start_transform("/nonexistent/video.mp4").await,
            Err(TriggerError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_preflight() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp, "http://127.0.0.1:1").await;
        let video = write_video(&tmp, "shorts_clip.mp4");

        assert!(matches!(
            pipeline.start_publish(&video, UploadMetadata::new(" ")).await,
            Err(TriggerError::InvalidMetadata(_))
        ));
        assert!(matches!(
            pipeline.start_publish(&video, UploadMetadata::new("Title")).await,
            Err(TriggerError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_publish_job_uploads_with_stored_session() {
        let server = MockServer::start().await;
        let session_url = format!("{}/upload-session/1", server.uri());
        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(200).insert_header("Location", session_url.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload-session/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "abc123"})))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp, &server.uri()).await;
        pipeline
            .authenticator()
            .store()
            .save(&valid_session())
            .await
            .unwrap();
        let video = write_video(&tmp, "shorts_clip.mp4");

        let handle = pipeline
            .start_publish(&video, UploadMetadata::new("My short"))
            .await
            .unwrap();
        let done = handle.wait().await;

        assert_eq!(done.state, JobState::Succeeded, "{:?}", done.failure);
        assert_eq!(
            done.outcome.unwrap().video_id(),
            Some(&RemoteVideoId::from("abc123"))
        );
    }

    #[tokio::test]
    async fn test_rejected_session_is_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp, &server.uri()).await;
        pipeline
            .authenticator()
            .store()
            .save(&valid_session())
            .await
            .unwrap();
        let video = write_video(&tmp, "shorts_clip.mp4");

        let done = pipeline
            .start_publish(&video, UploadMetadata::new("My short"))
            .await
            .unwrap()
            .wait()
            .await;
        assert_eq!(done.state, JobState::Failed);
        assert!(pipeline.authenticator().current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_malformed_credentials() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp, "http://127.0.0.1:1").await;

        assert!(matches!(
            pipeline.start_authenticate("").await,
            Err(TriggerError::MissingField("credentials"))
        ));
        let err = pipeline.start_authenticate("{not json").await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_begin_upload() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp, "http://127.0.0.1:1").await;

        assert!(matches!(
            pipeline.begin_upload(" ").await,
            Err(TriggerError::MissingField("file"))
        ));

        let mut upload = pipeline.begin_upload("../My Clip.mp4").await.unwrap();
        upload.write_chunk(b"da").await.unwrap();
        upload.write_chunk(b"ta").await.unwrap();
        let asset = upload.finish().await.unwrap();
        assert_eq!(asset.file_name(), Some("My_Clip.mp4"));
        assert_eq!(asset.size_bytes, 4);
        assert!(asset.path.starts_with(&pipeline.config().intake_dir));
    }

    #[cfg(unix)]
    fn fake_tool(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_stops_running_transform() {
        let tmp = TempDir::new().unwrap();
        let bin = tmp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let ffprobe = fake_tool(
            &bin,
            "ffprobe",
            r#"echo '{"format": {"duration": "90.0"}, "streams": [{"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "r_frame_rate": "30/1"}]}'"#,
        );
        let ffmpeg = fake_tool(
            &bin,
            "ffmpeg",
            "for last; do :; done\necho partial > \"$last\"\nexec sleep 30",
        );

        let config = PipelineConfig {
            ffmpeg_path: Some(ffmpeg),
            ffprobe_path: Some(ffprobe),
            ..PipelineConfig::rooted_at(tmp.path())
        };
        let http = reqwest::Client::new();
        let pipeline = Pipeline::with_components(
            config,
            Arc::new(NeverConsent),
            Arc::new(YouTubeTransport::with_base_url(http.clone(), "http://127.0.0.1:1")),
            http,
        )
        .await
        .unwrap();
        let video = write_video(&tmp, "landscape.mp4");

        let handle = pipeline.start_transform(&video).await.unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let snapshot = handle.snapshot();
            if snapshot.progress.percent >= 70 || snapshot.is_terminal() {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "render never started");
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        // Let the encoder start.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(handle.snapshot().state, JobState::Running);

        pipeline.shutdown();
        let done = tokio::time::timeout(std::time::Duration::from_secs(5), handle.wait())
            .await
            .expect("transform did not stop after shutdown");

        assert_eq!(done.state, JobState::Failed);
        assert!(done.progress.is_failure());
        let leftovers = std::fs::read_dir(&pipeline.config().processed_dir).unwrap().count();
        assert_eq!(leftovers, 0);
        assert!(std::path::Path::new(&video).exists());
    }
}
