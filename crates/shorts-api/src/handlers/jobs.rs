//! Job status handlers.
//!
//! Clients poll `GET /api/jobs/:job_id` or follow
//! `GET /api/jobs/:job_id/events`, a server-sent event stream that ends
//! with the job's terminal progress event.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use shorts_models::{JobId, JobSnapshot, ProgressEvent};
use shorts_worker::JobProgress;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub success: bool,
    pub job: JobSnapshot,
}

#[derive(Debug, Serialize)]
pub struct DeleteJobResponse {
    pub success: bool,
    /// False while the job is still queued or running
    pub removed: bool,
    pub job: JobSnapshot,
}

/// GET /api/jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job = state
        .pipeline
        .runner()
        .status(&JobId::from_string(job_id))
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    Ok(Json(JobResponse { success: true, job }))
}

/// DELETE /api/jobs/:job_id
///
/// Removes a finished job record. Active jobs are left in place.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<DeleteJobResponse>> {
    let id = JobId::from_string(job_id);
    let runner = state.pipeline.runner();

    if let Some(job) = runner.take(&id) {
        return Ok(Json(DeleteJobResponse {
            success: true,
            removed: true,
            job,
        }));
    }

    let job = runner
        .status(&id)
        .ok_or_else(|| ApiError::not_found("Job not found"))?;
    Ok(Json(DeleteJobResponse {
        success: true,
        removed: false,
        job,
    }))
}

/// GET /api/jobs/:job_id/events
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let id = JobId::from_string(job_id);

    // Subscribe before reading the record so no event falls in between.
    let rx = state.pipeline.hub().stream();
    let snapshot = state
        .pipeline
        .runner()
        .status(&id)
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    let finished = snapshot.is_terminal() || is_final(&snapshot.progress);
    let initial = JobProgress {
        job_id: snapshot.id.clone(),
        stage: snapshot.stage,
        event: snapshot.progress,
    };

    let first = stream::once(async move { sse_event(&initial) });
    let rest = stream::unfold((rx, finished), move |(mut rx, finished)| {
        let id = id.clone();
        async move {
            if finished {
                return None;
            }
            loop {
                match rx.recv().await {
                    Ok(progress) if progress.job_id == id => {
                        let done = is_final(&progress.event);
                        return Some((sse_event(&progress), (rx, done)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(job_id = %id, skipped, "Event stream lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!(job_id = %id, "Progress hub closed");
                        return None;
                    }
                }
            }
        }
    });

    Ok(Sse::new(first.chain(rest)).keep_alive(KeepAlive::default()))
}

fn is_final(event: &ProgressEvent) -> bool {
    event.is_complete() || event.is_failure()
}

fn sse_event(progress: &JobProgress) -> Result<Event, axum::Error> {
    Event::default().event("progress").json_data(progress)
}
