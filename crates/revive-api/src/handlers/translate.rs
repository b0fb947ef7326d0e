//! Translation endpoint.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    pub target_language: String,
}

#[derive(Serialize)]
pub struct TranslateResponse {
    pub translated_text: String,
}

/// `POST /api/translate`
pub async fn translate(
    State(state): State<AppState>,
    Json(request): Json<TranslateRequest>,
) -> ApiResult<Json<TranslateResponse>> {
    if request.text.trim().is_empty() {
        return Err(ApiError::bad_request("Text must not be empty"));
    }
    if request.target_language.trim().is_empty() {
        return Err(ApiError::bad_request("Target language must not be empty"));
    }

    let translated_text = state
        .translator
        .translate(&request.text, &request.target_language)
        .await?;
    metrics::record_translation(&request.target_language);

    Ok(Json(TranslateResponse { translated_text }))
}
