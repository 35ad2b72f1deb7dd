//! Chunked upload transport.
//!
//! [`UploadTransport::open`] starts a resumable upload session and returns a
//! [`ChunkedUpload`] whose `next_chunk` is driven by the publisher until the
//! platform returns the new video's id.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use shorts_models::{MediaAsset, RemoteVideoId, UploadMetadata};

use crate::error::{PublishError, PublishResult};
use crate::session::Session;

/// Default chunk size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
/// Resumable endpoints require chunk sizes in multiples of 256 KiB.
pub const CHUNK_ALIGNMENT: usize = 256 * 1024;

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com";

/// Answer to one chunk round-trip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkResponse {
    /// Fraction of the whole transfer acknowledged so far (0.0 to 1.0)
    pub progress: Option<f64>,
    /// Present once the upload is complete
    pub video_id: Option<RemoteVideoId>,
}

impl ChunkResponse {
    pub fn intermediate(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            video_id: None,
        }
    }

    pub fn complete(video_id: RemoteVideoId) -> Self {
        Self {
            progress: Some(1.0),
            video_id: Some(video_id),
        }
    }
}

/// An open chunked upload.
#[async_trait]
pub trait ChunkedUpload: Send {
    async fn next_chunk(&mut self) -> PublishResult<ChunkResponse>;
}

/// Opens chunked uploads against a platform.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn open(
        &self,
        asset: &MediaAsset,
        metadata: &UploadMetadata,
        session: &Session,
        chunk_size: usize,
    ) -> PublishResult<Box<dyn ChunkedUpload>>;
}

/// Round `size` up to a multiple of [`CHUNK_ALIGNMENT`] (at least one unit).
pub fn align_chunk_size(size: usize) -> usize {
    let units = size.div_ceil(CHUNK_ALIGNMENT).max(1);
    units * CHUNK_ALIGNMENT
}

/// Request body for `videos.insert`.
pub fn video_resource(metadata: &UploadMetadata) -> serde_json::Value {
    json!({
        "snippet": {
            "title": metadata.title,
            "description": metadata.description,
            "tags": metadata.keywords,
            "categoryId": metadata.category_id,
        },
        "status": {
            "privacyStatus": metadata.privacy.as_str(),
            "selfDeclaredMadeForKids": metadata.made_for_kids,
        }
    })
}

/// Resumable-upload protocol of the YouTube Data API.
#[derive(Debug, Clone)]
pub struct YouTubeTransport {
    http: reqwest::Client,
    base_url: String,
}

impl YouTubeTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, YOUTUBE_API_BASE)
    }

    /// Point at a different API host.
    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UploadTransport for YouTubeTransport {
    async fn open(
        &self,
        asset: &MediaAsset,
        metadata: &UploadMetadata,
        session: &Session,
        chunk_size: usize,
    ) -> PublishResult<Box<dyn ChunkedUpload>> {
        let file = tokio::fs::File::open(&asset.path)
            .await
            .map_err(|e| PublishError::asset_read(format!("{}: {}", asset.path.display(), e)))?;
        let total = file.metadata().await?.len();
        if total == 0 {
            return Err(PublishError::asset_read(format!("{} is empty", asset.path.display())));
        }

        let url = format!(
            "{}/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status",
            self.base_url
        );
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, session.authorization_header())
            .header("X-Upload-Content-Length", total.to_string())
            .header("X-Upload-Content-Type", content_type_for(asset))
            .json(&video_resource(metadata))
            .send()
            .await?;

        let status = response.status();
        if is_auth_failure(status) {
            return Err(PublishError::session_rejected(format!(
                "HTTP {} while opening upload",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::protocol(format!(
                "HTTP {} while opening upload: {}",
                status.as_u16(),
                body
            )));
        }
        let upload_url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::protocol("upload session has no Location header"))?;
        debug!(total, "Opened resumable upload session");

        Ok(Box::new(YouTubeUpload {
            http: self.http.clone(),
            upload_url,
            authorization: session.authorization_header(),
            content_type: content_type_for(asset),
            file,
            total,
            offset: 0,
            chunk_size: align_chunk_size(chunk_size),
        }))
    }
}

struct YouTubeUpload {
    http: reqwest::Client,
    upload_url: String,
    authorization: String,
    content_type: String,
    file: tokio::fs::File,
    total: u64,
    /// First byte not yet acknowledged by the server
    offset: u64,
    chunk_size: usize,
}

#[derive(Deserialize)]
struct InsertedVideo {
    id: String,
}

#[async_trait]
impl ChunkedUpload for YouTubeUpload {
    async fn next_chunk(&mut self) -> PublishResult<ChunkResponse> {
        if self.offset >= self.total {
            return Err(PublishError::protocol(
                "all bytes acknowledged but upload was not finalized",
            ));
        }

        let len = (self.total - self.offset).min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(self.offset)).await?;
        self.file.read_exact(&mut buf).await?;

        let end = self.offset + len as u64 - 1;
        let response = self
            .http
            .put(&self.upload_url)
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, &self.content_type)
            .header(CONTENT_LENGTH, len.to_string())
            .header(
                CONTENT_RANGE,
                format!("bytes {}-{}/{}", self.offset, end, self.total),
            )
            .body(buf)
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            200 | 201 => {
                let video: InsertedVideo = response
                    .json()
                    .await
                    .map_err(|e| PublishError::protocol(format!("unreadable upload response: {}", e)))?;
                self.offset = self.total;
                Ok(ChunkResponse::complete(RemoteVideoId::from(video.id)))
            }
            308 => {
                // Range: bytes=0-<last received byte>; absent means nothing stored yet.
                self.offset = response
                    .headers()
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_range_end)
                    .map(|last| last + 1)
                    .unwrap_or(0);
                Ok(ChunkResponse::intermediate(self.offset as f64 / self.total as f64))
            }
            _ if is_auth_failure(status) => Err(PublishError::session_rejected(format!(
                "HTTP {} during chunk transfer",
                status.as_u16()
            ))),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(PublishError::chunk_transfer(format!(
                    "HTTP {} for bytes {}-{}: {}",
                    status.as_u16(),
                    self.offset,
                    end,
                    body
                )))
            }
        }
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

fn content_type_for(asset: &MediaAsset) -> String {
    match asset.container.as_str() {
        "" => "video/*".to_string(),
        "mov" => "video/quicktime".to_string(),
        ext => format!("video/{}", ext),
    }
}

/// Last byte index from a `bytes=0-N` header value.
fn parse_range_end(value: &str) -> Option<u64> {
    value
        .trim()
        .strip_prefix("bytes=")?
        .split_once('-')?
        .1
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use shorts_models::PrivacyStatus;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

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

    async fn asset(dir: &TempDir, len: usize) -> MediaAsset {
        let path = dir.path().join("shorts_clip.mp4");
        tokio::fs::write(&path, vec![1u8; len]).await.unwrap();
        MediaAsset::new(path, len as u64)
    }

    #[test]
    fn test_align_chunk_size() {
        assert_eq!(align_chunk_size(DEFAULT_CHUNK_SIZE), DEFAULT_CHUNK_SIZE);
        assert_eq!(align_chunk_size(1), CHUNK_ALIGNMENT);
        assert_eq!(align_chunk_size(0), CHUNK_ALIGNMENT);
        assert_eq!(align_chunk_size(CHUNK_ALIGNMENT + 1), 2 * CHUNK_ALIGNMENT);
    }

    #[test]
    fn test_parse_range_end() {
        assert_eq!(parse_range_end("bytes=0-262143"), Some(262143));
        assert_eq!(parse_range_end("garbage"), None);
    }

    #[test]
    fn test_video_resource() {
        let meta = UploadMetadata::new("Title")
            .with_keywords(vec!["a".into(), "b".into()])
            .with_privacy(PrivacyStatus::Unlisted);
        let body = video_resource(&meta);
        assert_eq!(body["snippet"]["categoryId"], "22");
        assert_eq!(body["snippet"]["tags"][1], "b");
        assert_eq!(body["status"]["privacyStatus"], "unlisted");
        assert_eq!(body["status"]["selfDeclaredMadeForKids"], false);
    }

    #[tokio::test]
    async fn test_resumable_upload_two_chunks() {
        let server = MockServer::start().await;
        let total = CHUNK_ALIGNMENT + 1000;
        let session_url = format!("{}/upload-session/abc", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .and(query_param("uploadType", "resumable"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).insert_header("Location", session_url.as_str()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload-session/abc"))
            .and(header(
                "content-range",
                format!("bytes 0-{}/{}", CHUNK_ALIGNMENT - 1, total).as_str(),
            ))
            .respond_with(
                ResponseTemplate::new(308)
                    .insert_header("Range", format!("bytes=0-{}", CHUNK_ALIGNMENT - 1).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload-session/abc"))
            .and(header(
                "content-range",
                format!("bytes {}-{}/{}", CHUNK_ALIGNMENT, total - 1, total).as_str(),
            ))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "vid123"})))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let asset = asset(&tmp, total).await;
        let transport = YouTubeTransport::with_base_url(reqwest::Client::new(), server.uri());
        let mut upload = transport
            .open(&asset, &UploadMetadata::new("t"), &session(), CHUNK_ALIGNMENT)
            .await
            .unwrap();

        let first = upload.next_chunk().await.unwrap();
        assert!(first.video_id.is_none());
        let fraction = first.progress.unwrap();
        assert!((fraction - CHUNK_ALIGNMENT as f64 / total as f64).abs() < 1e-9);

        let second = upload.next_chunk().await.unwrap();
        assert_eq!(second.video_id, Some(RemoteVideoId::from("vid123")));
    }

    #[tokio::test]
    async fn test_open_unauthorized_is_session_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let asset = asset(&tmp, 10).await;
        let transport = YouTubeTransport::with_base_url(reqwest::Client::new(), server.uri());
        let err = transport
            .open(&asset, &UploadMetadata::new("t"), &session(), DEFAULT_CHUNK_SIZE)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PublishError::SessionRejected(_)));
    }

    #[tokio::test]
    async fn test_chunk_server_error_is_chunk_transfer() {
        let server = MockServer::start().await;
        let session_url = format!("{}/s", server.uri());
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).insert_header("Location", session_url.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let asset = asset(&tmp, 10).await;
        let transport = YouTubeTransport::with_base_url(reqwest::Client::new(), server.uri());
        let mut upload = transport
            .open(&asset, &UploadMetadata::new("t"), &session(), DEFAULT_CHUNK_SIZE)
            .await
            .unwrap();
        assert!(matches!(
            upload.next_chunk().await,
            Err(PublishError::ChunkTransfer(_))
        ));
    }
}
