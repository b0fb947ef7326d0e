//! Restoration job models.
//!
//! A `RestorationJob` records one restoration attempt end to end: which
//! strategy was selected, which providers were tried in what order, and
//! what each attempt produced. It lives only for the duration of the
//! request and is never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::image::Fingerprint;

/// Restoration strategy selected from the analysis flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestorationStrategy {
    /// One prompt-driven edit
    #[default]
    SinglePass,
    /// Structural restoration first, prompt-driven refinement second
    DoublePass,
}

impl RestorationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SinglePass => "single_pass",
            Self::DoublePass => "double_pass",
        }
    }

    /// Select the strategy from analysis qualification and caller opt-in.
    pub fn select(qualifies: bool, enhanced_mode: bool) -> Self {
        if qualifies && enhanced_mode {
            Self::DoublePass
        } else {
            Self::SinglePass
        }
    }
}

/// Outcome of one provider attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum AttemptOutcome {
    Success,
    Failure(String),
}

/// One provider invocation within a restoration job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAttempt {
    /// Which provider was invoked (e.g. "gemini-edit", "replicate-restore")
    pub provider: String,

    /// Which pass the attempt belonged to (1 or 2)
    pub pass: u8,

    /// What happened
    pub outcome: AttemptOutcome,
}

impl ProviderAttempt {
    pub fn success(provider: impl Into<String>, pass: u8) -> Self {
        Self {
            provider: provider.into(),
            pass,
            outcome: AttemptOutcome::Success,
        }
    }

    pub fn failure(provider: impl Into<String>, pass: u8, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            pass,
            outcome: AttemptOutcome::Failure(error.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

/// Transient record of one restoration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorationJob {
    /// Fingerprint of the input asset
    pub input_fingerprint: Fingerprint,

    /// Instruction handed to the prompt-driven editor
    pub instruction: String,

    /// Strategy selected for this job
    pub strategy: RestorationStrategy,

    /// Provider attempts in invocation order
    pub attempts: Vec<ProviderAttempt>,

    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl RestorationJob {
    pub fn new(
        input_fingerprint: Fingerprint,
        instruction: impl Into<String>,
        strategy: RestorationStrategy,
    ) -> Self {
        Self {
            input_fingerprint,
            instruction: instruction.into(),
            strategy,
            attempts: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Record an attempt.
    pub fn record(&mut self, attempt: ProviderAttempt) {
        self.attempts.push(attempt);
    }

    /// Total number of provider invocations so far.
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Whether any attempt succeeded.
    pub fn any_success(&self) -> bool {
        self.attempts.iter().any(ProviderAttempt::succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection_requires_both_conditions() {
        assert_eq!(
            RestorationStrategy::select(true, true),
            RestorationStrategy::DoublePass
        );
        assert_eq!(
            RestorationStrategy::select(true, false),
            RestorationStrategy::SinglePass
        );
        assert_eq!(
            RestorationStrategy::select(false, true),
            RestorationStrategy::SinglePass
        );
    }

    #[test]
    fn test_job_records_attempts_in_order() {
        let mut job = RestorationJob::new(
            Fingerprint::of(b"input"),
            "Restore and colorize.",
            RestorationStrategy::DoublePass,
        );
        job.record(ProviderAttempt::failure("replicate-restore", 1, "503"));
        job.record(ProviderAttempt::success("gemini-edit", 1));
        job.record(ProviderAttempt::success("gemini-edit", 2));

        assert_eq!(job.attempt_count(), 3);
        assert!(job.any_success());
        assert!(!job.attempts[0].succeeded());
        assert_eq!(job.attempts[1].pass, 1);
        assert_eq!(job.attempts[2].pass, 2);
    }
}
