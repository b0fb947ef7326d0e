//! Shared data models for the Revive backend.
//!
//! This crate provides Serde-serializable types for:
//! - Image assets and fingerprints
//! - Analysis results from the vision model
//! - Restoration jobs and strategies
//! - Video generation jobs and their status machine
//! - The per-session pipeline state machine

pub mod analysis;
pub mod image;
pub mod pipeline;
pub mod restoration;
pub mod video;

// Re-export common types
pub use analysis::{AnalysisResult, Lighting};
pub use image::{Fingerprint, ImageAsset};
pub use pipeline::{PipelineState, PipelineTrigger};
pub use restoration::{AttemptOutcome, ProviderAttempt, RestorationJob, RestorationStrategy};
pub use video::{JobHandle, VideoJob, VideoJobStatus, VideoProviderId};
