//! Attempt-with-fallback combinator.
//!
//! The fallback policy is defined once here and reused by restoration
//! and video orchestration alike: run the primary operation, and on a
//! fallback-eligible failure run the alternate exactly once. Refusals
//! and validation failures are surfaced immediately, and when both
//! sides fail neither error message is dropped.

use std::future::Future;

use metrics::counter;
use tracing::{info, warn};

use revive_providers::ProviderError;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Result of a fallback-protected attempt.
#[derive(Debug)]
pub struct FallbackOutcome<T> {
    pub value: T,
    /// Whether the fallback produced the value.
    pub used_fallback: bool,
    /// The primary's failure when the fallback produced the value.
    pub primary_error: Option<String>,
}

/// Run `primary`, falling back to `fallback` on a transport failure.
///
/// At most one fallback hop: if the fallback fails too, both failure
/// descriptions are aggregated into one error.
pub async fn attempt_with_fallback<T, P, F, PFut, FFut>(
    operation: &str,
    primary: P,
    fallback: Option<F>,
) -> OrchestratorResult<FallbackOutcome<T>>
where
    P: FnOnce() -> PFut,
    F: FnOnce() -> FFut,
    PFut: Future<Output = Result<T, ProviderError>>,
    FFut: Future<Output = Result<T, ProviderError>>,
{
    let primary_error = match primary().await {
        Ok(value) => {
            return Ok(FallbackOutcome {
                value,
                used_fallback: false,
                primary_error: None,
            })
        }
        Err(e) => e,
    };

    if !primary_error.is_fallback_eligible() {
        return Err(primary_error.into());
    }

    let Some(fallback) = fallback else {
        return Err(primary_error.into());
    };

    warn!(
        operation,
        error = %primary_error,
        "Primary provider failed, attempting fallback"
    );
    counter!("revive_provider_fallbacks_total", "operation" => operation.to_string())
        .increment(1);

    match fallback().await {
        Ok(value) => {
            info!(operation, "Fallback provider succeeded");
            Ok(FallbackOutcome {
                value,
                used_fallback: true,
                primary_error: Some(primary_error.to_string()),
            })
        }
        Err(fallback_error) => Err(OrchestratorError::BothProvidersFailed {
            primary: primary_error.to_string(),
            fallback: fallback_error.to_string(),
        }),
    }
}
