//! Pipeline session state machine.
//!
//! One pipeline instance exists per user session. Stages run strictly in
//! order; each transition is triggered by exactly one orchestrator call
//! completing, and any failure resets the machine to `Idle`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The per-session pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing in flight, waiting for an upload
    #[default]
    Idle,
    /// Analysis call in flight
    Analyzing,
    /// Perspective correction in flight
    Correcting,
    /// Restoration in flight
    Restoring,
    /// Instruction translation in flight
    Translating,
    /// Restored image available, video not yet requested
    ReadyForVideo,
    /// Video generation in flight
    GeneratingVideo,
    /// Video available
    Done,
}

/// Events that drive the pipeline forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineTrigger {
    Analyze,
    Correct,
    Restore,
    Translate,
    GenerateVideo,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Analyzing => "analyzing",
            Self::Correcting => "correcting",
            Self::Restoring => "restoring",
            Self::Translating => "translating",
            Self::ReadyForVideo => "ready_for_video",
            Self::GeneratingVideo => "generating_video",
            Self::Done => "done",
        }
    }

    /// Whether `trigger` may fire from this state.
    pub fn can_trigger(&self, trigger: PipelineTrigger) -> bool {
        matches!(
            (self, trigger),
            (Self::Idle, PipelineTrigger::Analyze)
                | (Self::Analyzing, PipelineTrigger::Correct)
                | (Self::Analyzing, PipelineTrigger::Restore)
                | (Self::Correcting, PipelineTrigger::Restore)
                | (Self::Restoring, PipelineTrigger::Translate)
                | (Self::ReadyForVideo, PipelineTrigger::GenerateVideo)
        )
    }

    /// The in-flight state a trigger moves the machine into.
    pub fn on_trigger(&self, trigger: PipelineTrigger) -> Option<PipelineState> {
        if !self.can_trigger(trigger) {
            return None;
        }
        Some(match trigger {
            PipelineTrigger::Analyze => Self::Analyzing,
            PipelineTrigger::Correct => Self::Correcting,
            PipelineTrigger::Restore => Self::Restoring,
            PipelineTrigger::Translate => Self::Translating,
            PipelineTrigger::GenerateVideo => Self::GeneratingVideo,
        })
    }

    /// The state reached when the current in-flight stage succeeds.
    ///
    /// `Restoring` and `Translating` both settle into `ReadyForVideo`;
    /// whether translation runs at all is the controller's decision.
    pub fn on_success(&self) -> PipelineState {
        match self {
            Self::Restoring | Self::Translating => Self::ReadyForVideo,
            Self::GeneratingVideo => Self::Done,
            // Analyzing/Correcting settle into themselves: the controller
            // immediately fires the next trigger from there.
            other => *other,
        }
    }

    /// The state reached on any unrecovered failure.
    pub fn on_failure(&self) -> PipelineState {
        Self::Idle
    }

    /// Whether an orchestrator call is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Analyzing
                | Self::Correcting
                | Self::Restoring
                | Self::Translating
                | Self::GeneratingVideo
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
