//! Orchestrator error types.

use thiserror::Error;

use revive_cache::QuotaDecision;
use revive_models::{PipelineState, PipelineTrigger};
use revive_providers::ProviderError;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A provider failed and no fallback applied (refusal, validation,
    /// or transport with no fallback configured)
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Primary and fallback both failed; both messages are kept
    #[error("Primary provider failed: {primary}; fallback provider failed: {fallback}")]
    BothProvidersFailed { primary: String, fallback: String },

    /// Caller-level quota exceeded; carries the structured decision
    #[error("Rate limited: {} of {} used", .0.limit - .0.remaining, .0.limit)]
    RateLimited(QuotaDecision),

    /// A trigger fired from a state that does not accept it
    #[error("Cannot {trigger:?} while {state}")]
    InvalidTransition {
        state: PipelineState,
        trigger: PipelineTrigger,
    },

    /// An eye-color request arrived while another is in flight
    #[error("An eye-color variant is already being generated")]
    VariantInFlight,

    /// Required session data is missing (e.g. restore before analyze)
    #[error("Session state missing: {0}")]
    MissingState(String),

    /// Video generation reached a terminal failure on every permitted
    /// provider
    #[error("Video generation failed: {0}")]
    VideoFailed(String),

    /// The video poll loop exceeded its wall-clock bound
    #[error("Video generation timed out")]
    VideoTimedOut,

    /// Polling referenced a job handle the orchestrator is not tracking
    #[error("Unknown video job: {0}")]
    UnknownJob(String),
}

impl OrchestratorError {
    pub fn missing_state(msg: impl Into<String>) -> Self {
        Self::MissingState(msg.into())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Whether the failure came from a content-safety refusal.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Provider(p) if p.is_refusal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregated_error_keeps_both_messages() {
        let err = OrchestratorError::BothProvidersFailed {
            primary: "gemini 503".into(),
            fallback: "replicate 502".into(),
        };
        let text = err.to_string();
        assert!(text.contains("gemini 503"));
        assert!(text.contains("replicate 502"));
    }

    #[test]
    fn test_refusal_detection_passes_through() {
        let err = OrchestratorError::Provider(ProviderError::refusal("policy"));
        assert!(err.is_refusal());
        let err = OrchestratorError::Provider(ProviderError::transport("503"));
        assert!(!err.is_refusal());
    }
}
