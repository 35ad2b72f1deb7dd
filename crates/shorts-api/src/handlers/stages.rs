//! Stage triggers: download, process, authenticate, upload.
//!
//! Each handler validates its body, hands off to the pipeline and answers
//! immediately with the new job's id. Only authentication completes inline.

use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use shorts_models::{JobId, PrivacyStatus, UploadMetadata};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Response for a dispatched stage.
#[derive(Debug, Serialize)]
pub struct StartedResponse {
    pub success: bool,
    pub message: String,
    pub job_id: JobId,
}

impl StartedResponse {
    fn new(message: &str, job_id: &JobId) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            job_id: job_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub video_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthenticateRequest {
    /// Client-secrets document, as an object or as a JSON string
    #[serde(default)]
    pub credentials: Option<serde_json::Value>,
}

/// Tags may arrive as a comma-separated string or as a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Tags {
    Joined(String),
    List(Vec<String>),
}

impl Tags {
    fn into_keywords(self) -> Vec<String> {
        match self {
            Tags::Joined(raw) => UploadMetadata::parse_keywords(&raw),
            Tags::List(list) => UploadMetadata::parse_keywords(&list.join(",")),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub video_path: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub privacy_status: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
}

impl UploadRequest {
    fn metadata(&mut self) -> ApiResult<UploadMetadata> {
        let title = non_empty(self.title.take()).ok_or_else(|| ApiError::bad_request("Invalid parameters"))?;
        let mut metadata = UploadMetadata::new(title)
            .with_description(self.description.take().unwrap_or_default())
            .with_keywords(self.tags.take().map(Tags::into_keywords).unwrap_or_default());

        if let Some(privacy) = non_empty(self.privacy_status.take()) {
            let privacy = PrivacyStatus::from_str(&privacy).map_err(|e| ApiError::bad_request(e.to_string()))?;
            metadata = metadata.with_privacy(privacy);
        }
        if let Some(category) = non_empty(self.category_id.take()) {
            metadata = metadata.with_category(category);
        }
        Ok(metadata)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// POST /api/download
pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> ApiResult<Json<StartedResponse>> {
    let Json(request) = payload?;
    let url = non_empty(request.url).ok_or_else(|| ApiError::bad_request("No URL provided"))?;

    let handle = state.pipeline.start_fetch(&url)?;
    info!(job_id = %handle.id(), url = %url, "Download dispatched");
    Ok(Json(StartedResponse::new("Download started", handle.id())))
}

/// POST /api/process
pub async fn process(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> ApiResult<Json<StartedResponse>> {
    let Json(request) = payload?;
    let video_path =
        non_empty(request.video_path).ok_or_else(|| ApiError::bad_request("Invalid video path"))?;

    let handle = state.pipeline.start_transform(&video_path).await?;
    info!(job_id = %handle.id(), path = %video_path, "Processing dispatched");
    Ok(Json(StartedResponse::new("Processing started", handle.id())))
}

/// POST /api/authenticate
pub async fn authenticate(
    State(state): State<AppState>,
    payload: Result<Json<AuthenticateRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(request) = payload?;
    let blob = match request.credentials {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
        Some(serde_json::Value::Object(map)) if !map.is_empty() => {
            serde_json::Value::Object(map).to_string()
        }
        _ => return Err(ApiError::bad_request("No credentials provided")),
    };

    state.pipeline.start_authenticate(&blob).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Authentication successful".to_string(),
    }))
}

/// POST /api/upload
pub async fn upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> ApiResult<Json<StartedResponse>> {
    let Json(mut request) = payload?;
    let video_path =
        non_empty(request.video_path.take()).ok_or_else(|| ApiError::bad_request("Invalid parameters"))?;
    let metadata = request.metadata()?;

    let handle = state.pipeline.start_publish(&video_path, metadata).await?;
    info!(job_id = %handle.id(), path = %video_path, "Upload dispatched");
    Ok(Json(StartedResponse::new("Upload started", handle.id())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_request_metadata() {
        let mut request: UploadRequest = serde_json::from_str(
            r#"{"video_path": "p.mp4", "title": " Clip ", "tags": "a, b,,c",
                "privacy_status": "unlisted", "category_id": "10"}"#,
        )
        .unwrap();
        let metadata = request.metadata().unwrap();
        assert_eq!(metadata.title, "Clip");
        assert_eq!(metadata.keywords, vec!["a", "b", "c"]);
        assert_eq!(metadata.privacy, PrivacyStatus::Unlisted);
        assert_eq!(metadata.category_id, "10");
    }

    #[test]
    fn test_upload_request_defaults() {
        let mut request: UploadRequest =
            serde_json::from_str(r#"{"title": "Clip", "tags": ["x", " y "]}"#).unwrap();
        let metadata = request.metadata().unwrap();
        assert_eq!(metadata.privacy, PrivacyStatus::Private);
        assert_eq!(metadata.category_id, "22");
        assert_eq!(metadata.keywords, vec!["x", "y"]);
    }

    #[test]
    fn test_upload_request_rejects_bad_privacy() {
        let mut request: UploadRequest =
            serde_json::from_str(r#"{"title": "Clip", "privacy_status": "secret"}"#).unwrap();
        assert!(matches!(request.metadata(), Err(ApiError::BadRequest(_))));
    }
}
