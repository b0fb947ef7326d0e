//! Video generation job models.
//!
//! Video synthesis runs for minutes, so providers hand back an opaque
//! job handle at start time and the orchestrator polls for completion.
//! The status machine here is the single source of truth for which
//! transitions are legal.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An opaque, provider-specific identifier for an in-progress job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which video provider issued a job handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VideoProviderId {
    /// Primary provider (long-running operations API)
    Primary,
    /// Alternate provider (prediction API), also the safety-routing target
    Alternate,
}

impl VideoProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Alternate => "alternate",
        }
    }

    /// The other provider, used for the single fallback switch.
    pub fn other(&self) -> Self {
        match self {
            Self::Primary => Self::Alternate,
            Self::Alternate => Self::Primary,
        }
    }
}

/// Video job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoJobStatus {
    /// Job accepted by the provider, not yet picked up
    #[default]
    Pending,
    /// Provider is actively generating
    Processing,
    /// Generation finished, output reference available
    Succeeded,
    /// Provider reported a failure
    Failed,
    /// Job was canceled provider-side
    Canceled,
    /// The orchestrator stopped waiting (wall-clock bound exceeded)
    TimedOut,
}

impl VideoJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::TimedOut => "timed_out",
        }
    }

    /// Terminal statuses are absorbing: no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Canceled | Self::TimedOut
        )
    }

    /// Whether a transition to `next` is legal.
    ///
    /// A job never re-enters `Pending` after leaving it, and terminal
    /// statuses accept nothing.
    pub fn can_transition_to(&self, next: VideoJobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self {
            Self::Pending => next != Self::Pending,
            Self::Processing => next != Self::Pending && next != Self::Processing,
            _ => false,
        }
    }
}

impl std::fmt::Display for VideoJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A long-running animation request, as observed through polling.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoJob {
    /// Provider-issued handle
    pub handle: JobHandle,

    /// Provider that issued the handle
    pub provider: VideoProviderId,

    /// Current status
    pub status: VideoJobStatus,

    /// Output reference (URL) once succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,

    /// Provider error text if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// When the job was started
    pub started_at: DateTime<Utc>,

    /// When the status was last observed
    pub updated_at: DateTime<Utc>,
}

impl VideoJob {
    /// Create a freshly started job in `Pending`.
    pub fn started(handle: JobHandle, provider: VideoProviderId) -> Self {
        let now = Utc::now();
        Self {
            handle,
            provider,
            status: VideoJobStatus::Pending,
            output_ref: None,
            error_message: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an observed status, rejecting illegal transitions.
    ///
    /// Returns `false` (and leaves the job untouched) when the observed
    /// status would move the machine backwards, which can happen when a
    /// stale poll response arrives out of order.
    pub fn observe(&mut self, status: VideoJobStatus) -> bool {
        if status == self.status {
            self.updated_at = Utc::now();
            return true;
        }
        if !self.status.can_transition_to(status) {
            return false;
        }
        self.status = status;
        self.updated_at = Utc::now();
        true
    }

    /// Mark succeeded with an output reference.
    pub fn succeed(&mut self, output_ref: impl Into<String>) {
        self.status = VideoJobStatus::Succeeded;
        self.output_ref = Some(output_ref.into());
        self.updated_at = Utc::now();
    }

    /// Mark failed with a provider error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = VideoJobStatus::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Mark timed out (orchestrator stopped waiting).
    pub fn time_out(&mut self) {
        self.status = VideoJobStatus::TimedOut;
        self.error_message = Some("Video generation timed out".into());
        self.updated_at = Utc::now();
    }
}
