//! Orchestration layer of the Revive backend.
//!
//! Sequences the fallible calls to the external generative providers:
//! restoration with provider fallback and double-pass refinement, the
//! async video job state machine, and the per-session pipeline
//! controller that drives the whole journey.

pub mod error;
pub mod fallback;
pub mod pipeline;
pub mod restoration;
pub mod video;

pub use error::{OrchestratorError, OrchestratorResult};
pub use fallback::{attempt_with_fallback, FallbackOutcome};
pub use pipeline::{
    analyze_with_retry, PipelineController, PipelineControllerConfig, RestoreRequest,
    RestoreResponse,
};
pub use restoration::{RestorationOrchestrator, RestorationOutcome};
pub use video::{VideoJobOrchestrator, VideoPollConfig};
