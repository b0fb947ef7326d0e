//! Normalized provider error taxonomy.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Error taxonomy shared by every provider adapter.
///
/// Orchestrators branch on these variants only: a `Transport` failure is
/// eligible for one fallback hop, a `Refusal` never is, and `Validation`
/// marks a structurally broken response that retrying the same call may
/// fix (the analysis retry policy) but fallback will not.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Malformed or structurally incomplete request/response
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider explicitly declined to produce output (content policy)
    #[error("Provider refused the request: {0}")]
    Refusal(String),

    /// Network, availability, or provider-side rate-limit failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// A polling operation exceeded its hard wall-clock bound
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl ProviderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn refusal(msg: impl Into<String>) -> Self {
        Self::Refusal(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Only transport failures are eligible for provider fallback.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Refusal(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_fallback_eligible() {
        assert!(ProviderError::transport("503").is_fallback_eligible());
        assert!(!ProviderError::refusal("content policy").is_fallback_eligible());
        assert!(!ProviderError::validation("missing field").is_fallback_eligible());
        assert!(!ProviderError::timeout("10m elapsed").is_fallback_eligible());
    }
}
