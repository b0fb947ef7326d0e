//! Restoration endpoint.

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use revive_models::RestorationStrategy;
use revive_orchestrator::OrchestratorError;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{decode_image, encode_image};
use crate::metrics;
use crate::middleware::{extract_client_country, extract_client_ip};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct EditRequest {
    /// Base64-encoded image, bare or as a data URL.
    pub image: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Restoration instruction for the prompt-driven editor.
    pub instruction: String,
    /// Opt into the double-pass strategy when the photo qualifies.
    #[serde(default)]
    pub use_double_pass: bool,
    /// Iris color for the eye-color variant flow.
    #[serde(default)]
    pub eye_color: Option<String>,
    #[serde(default)]
    pub has_eye_color_potential: bool,
    #[serde(default)]
    pub person_count: u32,
    #[serde(default)]
    pub is_black_and_white: bool,
    /// The provided image is already restored; only recolor the irises.
    #[serde(default)]
    pub is_eye_color_change_only: bool,
}

impl EditRequest {
    /// Mirror of the analysis-side qualification, reconstructed from
    /// the flags the client sends back.
    fn qualifies_for_double_pass(&self) -> bool {
        self.person_count > 1 || self.is_black_and_white
    }
}

#[derive(Serialize)]
pub struct EditResponse {
    /// Base64-encoded result in the canonical delivery format.
    pub image: String,
    pub mime_type: String,
}

/// `POST /api/edit`
///
/// Runs the restoration chain, or the cached eye-color variant flow
/// when `is_eye_color_change_only` is set. Quota is charged before any
/// provider call; a denial returns the structured 429 body.
pub async fn edit(
    State(state): State<AppState>,
    request: Request<Body>,
) -> ApiResult<Json<EditResponse>> {
    let identity = extract_client_ip(&request)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "anonymous".to_string());
    let country = extract_client_country(&request);

    let body = axum::body::to_bytes(request.into_body(), state.config.max_body_size)
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read body: {e}")))?;
    let request: EditRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))?;

    if request.instruction.trim().is_empty() && !request.is_eye_color_change_only {
        return Err(ApiError::bad_request("Instruction must not be empty"));
    }

    // Malformed uploads are rejected before the quota window is charged.
    let image = decode_image(&request.image, request.mime_type.as_deref())?;

    let decision = state.quota.check(&identity, country.as_deref()).await;
    if !decision.allowed {
        metrics::record_quota_rejection();
        return Err(ApiError::RateLimited(decision));
    }

    // Eye-color-only requests reuse the cached variant flow against the
    // already-restored image instead of re-running restoration.
    if request.is_eye_color_change_only {
        let color = request
            .eye_color
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("eye_color is required for an eye-color change"))?;
        let variant = state
            .restoration
            .eye_color_variant(&image, &request.instruction, color)
            .await?;
        return Ok(Json(EditResponse {
            image: encode_image(&variant),
            mime_type: variant.mime_type().to_string(),
        }));
    }

    let strategy = RestorationStrategy::select(
        request.qualifies_for_double_pass(),
        request.use_double_pass,
    );
    info!(strategy = strategy.as_str(), size = image.len(), "Restoration requested");

    let start = Instant::now();
    let outcome = state
        .restoration
        .restore(&image, &request.instruction, strategy)
        .await
        .map_err(ApiError::from)?;
    metrics::record_restoration_duration(strategy.as_str(), start.elapsed().as_secs_f64());

    // A requested eye color is applied on top of the fresh restoration.
    let asset = match request.eye_color.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(color) if request.has_eye_color_potential => state
            .restoration
            .eye_color_variant(&outcome.asset, &request.instruction, color)
            .await
            .map_err(|e: OrchestratorError| ApiError::from(e))?,
        _ => outcome.asset,
    };

    Ok(Json(EditResponse {
        image: encode_image(&asset),
        mime_type: asset.mime_type().to_string(),
    }))
}
