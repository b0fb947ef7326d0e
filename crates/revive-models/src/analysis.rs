//! Analysis result models.
//!
//! The vision model returns a single structured document per uploaded
//! photo. Every downstream branching decision (double-pass selection,
//! perspective correction, video provider routing, eye-color variants)
//! reads from this document, so it is created once and never mutated.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lighting descriptor extracted from the photo.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Lighting {
    /// Dominant light direction (e.g. "left", "overhead")
    pub direction: String,

    /// Light quality (e.g. "soft", "harsh")
    pub quality: String,

    /// Light source type (e.g. "natural", "studio flash")
    #[serde(rename = "type")]
    pub light_type: String,

    /// Shadow strength (e.g. "subtle", "pronounced")
    pub shadow_strength: String,

    /// Free-text description of the overall lighting
    pub description: String,
}

/// Structured metadata about an uploaded photo.
///
/// Deserialization is strict: a response missing any required field is
/// rejected as a whole rather than partially populated, so callers can
/// rely on every field being present.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AnalysisResult {
    /// Whether the photo appears to contain minors
    pub contains_minors: bool,

    /// Whether the photo is shot at an angle and needs perspective correction
    pub needs_perspective_correction: bool,

    /// Whether the photo contains many subjects (group photo)
    pub has_many_subjects: bool,

    /// Whether the photo is monochrome (black & white or sepia)
    pub is_monochrome: bool,

    /// Whether the photo shows heavy age damage
    pub is_very_old: bool,

    /// Whether the subjects' eyes are prominent enough for iris-color tuning
    pub has_eye_color_potential: bool,

    /// Number of human subjects detected
    pub subject_count: u32,

    /// Lighting descriptor
    pub lighting: Lighting,

    /// Full restoration instruction for the prompt-driven editor
    pub restoration_instruction: String,

    /// Animation instruction for the video generator
    pub animation_instruction: String,

    /// Suggested output file name
    pub suggested_name: String,
}

impl AnalysisResult {
    /// Whether this photo qualifies for the double-pass restoration
    /// strategy. The caller must additionally opt into enhanced mode.
    pub fn qualifies_for_double_pass(&self) -> bool {
        self.has_many_subjects || self.is_monochrome || self.is_very_old
    }

    /// Check that all free-text fields are non-empty.
    ///
    /// Some providers return the full JSON shape with empty strings when
    /// they cannot analyze the image; that counts as structurally
    /// incomplete and is retried at the controller layer.
    pub fn is_complete(&self) -> bool {
        !self.restoration_instruction.trim().is_empty()
            && !self.animation_instruction.trim().is_empty()
            && !self.suggested_name.trim().is_empty()
    }
}
