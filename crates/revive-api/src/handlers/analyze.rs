//! Image analysis endpoint.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use revive_models::AnalysisResult;
use revive_orchestrator::analyze_with_retry;

use crate::error::ApiResult;
use crate::handlers::decode_image;
use crate::metrics;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    /// Base64-encoded image, bare or as a data URL.
    pub image: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Language for the analysis free-text fields.
    #[serde(default = "default_language")]
    pub language: String,
    /// Optional styling hint appended to the analysis prompt.
    #[serde(default)]
    pub hint: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

/// `POST /api/analyze`
///
/// Returns the full structured analysis document. Structurally bad
/// provider responses are retried before a failure surfaces.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalysisResult>> {
    let image = decode_image(&request.image, request.mime_type.as_deref())?;
    info!(
        size = image.len(),
        language = %request.language,
        "Analysis requested"
    );

    let result = analyze_with_retry(
        state.analyzer.as_ref(),
        &image,
        &request.language,
        request.hint.as_deref(),
        &state.analysis_config,
    )
    .await;

    match result {
        Ok(analysis) => {
            metrics::record_analysis("ok");
            Ok(Json(analysis))
        }
        Err(e) => {
            metrics::record_analysis("error");
            Err(e.into())
        }
    }
}
