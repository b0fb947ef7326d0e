//! Normalized adapters for the external generative providers.
//!
//! Each adapter coerces one provider's wire format into the uniform
//! capability traits in [`adapter`], so the orchestration layers only
//! ever branch on the normalized [`ProviderError`] taxonomy, never on a
//! provider-specific response shape.

pub mod adapter;
pub mod error;
pub mod gemini;
pub mod normalize;
pub mod replicate;

pub use adapter::{ImageAnalyzer, ImageEditor, Translator, VideoGenerator};
pub use error::{ProviderError, ProviderResult};
pub use gemini::GeminiClient;
pub use normalize::{normalize_image, NormalizeLimits};
pub use replicate::ReplicateClient;
