//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use revive_cache::QuotaDecision;
use revive_orchestrator::OrchestratorError;
use revive_providers::ProviderError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited(QuotaDecision),

    #[error("Content refused: {0}")]
    Refused(String),

    #[error("Provider unavailable: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Refused(_) => StatusCode::UNPROCESSABLE_ENTITY,
            // Provider failures keep their aggregated detail so the
            // client can show which side failed.
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::RateLimited(decision) => Self::RateLimited(decision),
            OrchestratorError::Provider(ProviderError::Validation(msg)) => Self::BadRequest(msg),
            OrchestratorError::Provider(ProviderError::Refusal(msg)) => Self::Refused(msg),
            OrchestratorError::Provider(e) => Self::Upstream(e.to_string()),
            OrchestratorError::BothProvidersFailed { .. } => Self::Upstream(err.to_string()),
            OrchestratorError::UnknownJob(handle) => {
                Self::NotFound(format!("Unknown video job: {handle}"))
            }
            OrchestratorError::InvalidTransition { .. } | OrchestratorError::VariantInFlight => {
                Self::Conflict(err.to_string())
            }
            OrchestratorError::MissingState(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        Self::from(OrchestratorError::Provider(err))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

/// Structured 429 body mirroring the quota decision.
#[derive(Serialize)]
struct QuotaExceededResponse {
    detail: String,
    limit: u32,
    remaining: u32,
    reset_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let ApiError::RateLimited(decision) = &self {
            let body = QuotaExceededResponse {
                detail: "Restoration quota exceeded".to_string(),
                limit: decision.limit,
                remaining: decision.remaining,
                reset_time: decision.reset_time.to_rfc3339(),
                country: decision.country.clone(),
            };
            return (status, Json(body)).into_response();
        }

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}
