//! Direct file intake.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use shorts_worker::TriggerError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Multipart field carrying the video.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadFileResponse {
    pub success: bool,
    pub message: String,
    pub file_path: String,
    pub size_bytes: u64,
}

/// POST /api/upload_file
///
/// Streams the `file` part into the intake directory under a sanitized,
/// non-colliding name. Other parts are ignored.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadFileResponse>> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().trim().to_string();
        if file_name.is_empty() {
            return Err(ApiError::bad_request("No file selected"));
        }

        let mut upload = state.pipeline.begin_upload(&file_name).await?;
        while let Some(chunk) = field.chunk().await? {
            upload.write_chunk(&chunk).await.map_err(TriggerError::from)?;
        }
        let asset = upload.finish().await.map_err(TriggerError::from)?;
        info!(
            path = %asset.path.display(),
            size_mb = asset.size_mb(),
            "Stored uploaded file"
        );

        return Ok(Json(UploadFileResponse {
            success: true,
            message: "File uploaded successfully".to_string(),
            file_path: asset.path.display().to_string(),
            size_bytes: asset.size_bytes,
        }));
    }

    Err(ApiError::bad_request("No file provided"))
}
