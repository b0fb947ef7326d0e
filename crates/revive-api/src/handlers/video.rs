//! Video generation endpoints.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use revive_models::{JobHandle, VideoJobStatus, VideoProviderId};

use crate::error::{ApiError, ApiResult};
use crate::handlers::decode_image;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct VideoStartRequest {
    /// Animation instruction.
    pub prompt: String,
    /// Base64-encoded source image (the restored photo).
    pub image: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Route to the alternate provider first (safety routing).
    #[serde(default)]
    pub contains_minors: bool,
}

#[derive(Serialize)]
pub struct VideoStartResponse {
    pub job_handle: String,
    pub provider: VideoProviderId,
    pub status: VideoJobStatus,
}

/// `POST /api/video/start`
///
/// Starts generation and returns promptly with a handle to poll.
pub async fn start_video(
    State(state): State<AppState>,
    Json(request): Json<VideoStartRequest>,
) -> ApiResult<Json<VideoStartResponse>> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("Prompt must not be empty"));
    }
    let image = decode_image(&request.image, request.mime_type.as_deref())?;

    let provider = if request.contains_minors {
        VideoProviderId::Alternate
    } else {
        VideoProviderId::Primary
    };
    // Fall back to the primary when no alternate is wired.
    let provider = match state.video.start(provider, &request.prompt, &image).await {
        Ok(job) => {
            return Ok(Json(VideoStartResponse {
                job_handle: job.handle.to_string(),
                provider: job.provider,
                status: job.status,
            }))
        }
        Err(e) if provider == VideoProviderId::Alternate => {
            info!(error = %e, "Alternate video provider unavailable, using primary");
            VideoProviderId::Primary
        }
        Err(e) => return Err(e.into()),
    };

    let job = state.video.start(provider, &request.prompt, &image).await?;
    Ok(Json(VideoStartResponse {
        job_handle: job.handle.to_string(),
        provider: job.provider,
        status: job.status,
    }))
}

#[derive(Deserialize)]
pub struct VideoStatusRequest {
    pub job_handle: String,
}

#[derive(Serialize)]
pub struct VideoStatusResponse {
    pub status: VideoJobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/video/status`
///
/// Observes a started job once. Transient provider errors report the
/// last recorded status instead of failing the poll.
pub async fn video_status(
    State(state): State<AppState>,
    Json(request): Json<VideoStatusRequest>,
) -> ApiResult<Json<VideoStatusResponse>> {
    let handle = JobHandle::new(request.job_handle);

    let job = match state.video.poll_tracked(&handle).await {
        Ok(job) => job,
        Err(revive_orchestrator::OrchestratorError::Provider(e)) if e.is_fallback_eligible() => {
            state.video.status(&handle).await?
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(VideoStatusResponse {
        status: job.status,
        output_ref: job.output_ref,
        error: job.error_message,
    }))
}
