//! Publishing a finished asset.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use shorts_media::{ProgressSink, StageProgress};
use shorts_models::{MediaAsset, RemoteVideoId, UploadMetadata};

use crate::error::{PublishError, PublishResult};
use crate::session::Session;
use crate::upload::{align_chunk_size, UploadTransport};

/// Percent reported once the upload session is open; chunk progress fills the rest.
const TRANSFER_START: f64 = 30.0;

/// Drives a chunked upload and maps its progress onto the stage scale.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn UploadTransport>,
    chunk_size: usize,
}

impl Publisher {
    /// `chunk_size` is rounded up to the transport's required alignment.
    pub fn new(transport: Arc<dyn UploadTransport>, chunk_size: usize) -> Self {
        Self {
            transport,
            chunk_size: align_chunk_size(chunk_size),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub async fn publish(
        &self,
        asset: &MediaAsset,
        metadata: &UploadMetadata,
        session: &Session,
        progress: &dyn ProgressSink,
    ) -> PublishResult<RemoteVideoId> {
        self.publish_with_cancel(asset, metadata, session, progress, None)
            .await
    }

    /// Like [`Publisher::publish`], checking `cancel` between chunks.
    pub async fn publish_with_cancel(
        &self,
        asset: &MediaAsset,
        metadata: &UploadMetadata,
        session: &Session,
        progress: &dyn ProgressSink,
        cancel: Option<watch::Receiver<bool>>,
    ) -> PublishResult<RemoteVideoId> {
        let stage = StageProgress::new(progress);
        match self
            .publish_inner(asset, metadata, session, &stage, cancel)
            .await
        {
            Ok(video_id) => {
                info!(video_id = %video_id, path = %asset.path.display(), "Upload complete");
                stage.complete("Upload complete!");
                Ok(video_id)
            }
            Err(e) => {
                warn!(path = %asset.path.display(), kind = e.kind(), "Upload failed: {}", e);
                stage.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn publish_inner(
        &self,
        asset: &MediaAsset,
        metadata: &UploadMetadata,
        session: &Session,
        stage: &StageProgress<'_>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> PublishResult<RemoteVideoId> {
        metadata
            .check()
            .map_err(|e| PublishError::invalid_metadata(e.to_string()))?;

        let size = tokio::fs::metadata(&asset.path)
            .await
            .map_err(|e| PublishError::asset_read(format!("{}: {}", asset.path.display(), e)))?
            .len();
        if size == 0 {
            return Err(PublishError::asset_read(format!(
                "{} is empty",
                asset.path.display()
            )));
        }

        stage.report(10, "Starting upload...");
        stage.report(20, "Initiating upload...");
        let mut upload = self
            .transport
            .open(asset, metadata, session, self.chunk_size)
            .await?;
        stage.report(TRANSFER_START as u8, "Uploading...");

        loop {
            if cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false) {
                return Err(PublishError::Cancelled);
            }

            let response = upload.next_chunk().await?;
            if let Some(video_id) = response.video_id {
                return Ok(video_id);
            }
            if let Some(fraction) = response.progress {
                let fraction = fraction.clamp(0.0, 1.0);
                let percent = (TRANSFER_START + fraction * (100.0 - TRANSFER_START)).round() as u8;
                stage.advance(
                    percent,
                    format!("Uploading... {}%", (fraction * 100.0).round() as u8),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{ChunkResponse, ChunkedUpload};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use shorts_media::RecordingProgress;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replays a fixed list of chunk answers.
    struct ScriptedTransport {
        script: Mutex<Option<VecDeque<PublishResult<ChunkResponse>>>>,
        opens: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: Vec<PublishResult<ChunkResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(Some(script.into())),
                opens: AtomicUsize::new(0),
            })
        }
    }

    struct ScriptedUpload {
        script: VecDeque<PublishResult<ChunkResponse>>,
    }

    #[async_trait]
    impl ChunkedUpload for ScriptedUpload {
        async fn next_chunk(&mut self) -> PublishResult<ChunkResponse> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(PublishError::protocol("script exhausted")))
        }
    }

    #[async_trait]
    impl UploadTransport for ScriptedTransport {
        async fn open(
            &self,
            _asset: &MediaAsset,
            _metadata: &UploadMetadata,
            _session: &Session,
            _chunk_size: usize,
        ) -> PublishResult<Box<dyn ChunkedUpload>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let script = self.script.lock().unwrap().take().unwrap_or_default();
            Ok(Box::new(ScriptedUpload { script }))
        }
    }

    fn session() -> Session {
        Session {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + ChronoDuration::hours(1),
            scopes: vec![],
            token_uri: "http://127.0.0.1:1/token".to_string(),
            client_id: "cid".to_string(),
            client_secret: None,
        }
    }

    fn asset(dir: &TempDir) -> MediaAsset {
        let path = dir.path().join("shorts_clip.mp4");
        std::fs::write(&path, b"video-bytes").unwrap();
        MediaAsset::new(path, 11)
    }

    #[tokio::test]
    async fn test_progress_mapping() {
        let transport = ScriptedTransport::new(vec![
            Ok(ChunkResponse::intermediate(0.0)),
            Ok(ChunkResponse::intermediate(0.25)),
            Ok(ChunkResponse::intermediate(0.5)),
            Ok(ChunkResponse::intermediate(0.75)),
            Ok(ChunkResponse::complete(RemoteVideoId::from("abc123"))),
        ]);
        let publisher = Publisher::new(transport.clone(), 1);
        let tmp = TempDir::new().unwrap();
        let sink = RecordingProgress::new();

        let id = publisher
            .publish(&asset(&tmp), &UploadMetadata::new("My short"), &session(), &sink)
            .await
            .unwrap();

        assert_eq!(id.as_str(), "abc123");
        assert_eq!(sink.percents(), vec![10, 20, 30, 48, 65, 83, 100]);
        assert_eq!(sink.last().unwrap().message, "Upload complete!");
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_metadata_never_opens() {
        let transport = ScriptedTransport::new(vec![]);
        let publisher = Publisher::new(transport.clone(), DEFAULT_TEST_CHUNK);
        let tmp = TempDir::new().unwrap();
        let sink = RecordingProgress::new();

        let err = publisher
            .publish(&asset(&tmp), &UploadMetadata::new("   "), &session(), &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::InvalidMetadata(_)));
        assert_eq!(transport.opens.load(Ordering::SeqCst), 0);
        let last = sink.last().unwrap();
        assert_eq!(last.percent, 0);
        assert!(last.message.starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_missing_asset_fails_before_open() {
        let transport = ScriptedTransport::new(vec![]);
        let publisher = Publisher::new(transport.clone(), DEFAULT_TEST_CHUNK);
        let asset = MediaAsset::new("/nonexistent/shorts_clip.mp4", 0);

        let err = publisher
            .publish(&asset, &UploadMetadata::new("t"), &session(), &RecordingProgress::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::AssetRead(_)));
        assert_eq!(transport.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chunk_failure_reports_error() {
        let transport = ScriptedTransport::new(vec![
            Ok(ChunkResponse::intermediate(0.5)),
            Err(PublishError::chunk_transfer("HTTP 503")),
        ]);
        let publisher = Publisher::new(transport, DEFAULT_TEST_CHUNK);
        let tmp = TempDir::new().unwrap();
        let sink = RecordingProgress::new();

        let err = publisher
            .publish(&asset(&tmp), &UploadMetadata::new("t"), &session(), &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::ChunkTransfer(_)));
        assert_eq!(sink.percents(), vec![10, 20, 30, 65, 0]);
    }

    #[tokio::test]
    async fn test_cancel_between_chunks() {
        let transport = ScriptedTransport::new(vec![Ok(ChunkResponse::intermediate(0.5))]);
        let publisher = Publisher::new(transport, DEFAULT_TEST_CHUNK);
        let tmp = TempDir::new().unwrap();
        let (tx, rx) = watch::channel(true);

        let err = publisher
            .publish_with_cancel(
                &asset(&tmp),
                &UploadMetadata::new("t"),
                &session(),
                &RecordingProgress::new(),
                Some(rx),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Cancelled));
        drop(tx);
    }

    #[test]
    fn test_chunk_size_alignment() {
        let publisher = Publisher::new(ScriptedTransport::new(vec![]), 300_000);
        assert_eq!(publisher.chunk_size(), 2 * 256 * 1024);
    }

    const DEFAULT_TEST_CHUNK: usize = crate::upload::DEFAULT_CHUNK_SIZE;
}
