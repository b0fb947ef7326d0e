//! Capability traits implemented by every provider adapter.
//!
//! The traits are object-safe so orchestrators can hold `Arc<dyn ...>`
//! and swap providers at configuration time. Mock implementations are
//! available behind the `testing` feature for downstream tests.

use async_trait::async_trait;

use revive_models::{AnalysisResult, ImageAsset, JobHandle, VideoJob};

use crate::error::ProviderResult;

/// Structured image analysis.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    /// Analyze an image and return the full structured document.
    ///
    /// Must fail with `Validation` if any declared field is absent rather
    /// than returning partially-populated data.
    // Lifetimes are spelled out so automock can name them.
    async fn analyze<'a>(
        &self,
        image: &ImageAsset,
        language: &str,
        hint: Option<&'a str>,
    ) -> ProviderResult<AnalysisResult>;
}

/// Instruction-driven image editing.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Stable identifier used in attempt records and logs.
    fn id(&self) -> &'static str;

    /// Apply an instruction to an image, optionally steered by a
    /// reference image.
    ///
    /// Fails with `Refusal` when the provider declines on content-safety
    /// grounds (no image part in the response) and `Transport` for
    /// network/availability failures; only the latter is failed over.
    async fn edit<'a>(
        &self,
        image: &ImageAsset,
        instruction: &str,
        reference: Option<&'a ImageAsset>,
    ) -> ProviderResult<ImageAsset>;
}

/// Asynchronous video generation.
///
/// Start and poll are split because synthesis runs for minutes and must
/// never block a request/response cycle.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    fn id(&self) -> &'static str;

    /// Start a generation job; must return promptly with a handle.
    async fn start(&self, prompt: &str, image: &ImageAsset) -> ProviderResult<JobHandle>;

    /// Observe the current status of a job.
    async fn poll(&self, handle: &JobHandle) -> ProviderResult<VideoJob>;
}

/// Text translation.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str) -> ProviderResult<String>;
}
