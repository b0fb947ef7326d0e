//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub gemini: CheckStatus,
    pub replicate: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            detail: None,
        }
    }

    fn degraded(msg: impl Into<String>) -> Self {
        Self {
            status: "degraded".to_string(),
            detail: Some(msg.into()),
        }
    }
}

/// Readiness check endpoint.
///
/// Verifies that the provider credentials the process was started with
/// are present. The primary provider is required; the fallback chain is
/// reported as degraded rather than failing the probe.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let gemini = if state.config.gemini_api_key.is_empty() {
        CheckStatus::degraded("GEMINI_API_KEY not configured")
    } else {
        CheckStatus::ok()
    };
    let replicate = if state.config.replicate_api_token.is_empty() {
        CheckStatus::degraded("REPLICATE_API_TOKEN not configured, fallback chain disabled")
    } else {
        CheckStatus::ok()
    };

    let primary_ok = gemini.detail.is_none();
    let response = ReadinessResponse {
        status: if primary_ok { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks { gemini, replicate },
    };

    if primary_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
