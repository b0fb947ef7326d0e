//! Image size/format normalization.
//!
//! Uploaded bytes are constrained to a maximum resolution and file size
//! before they reach any provider, and every restoration result is
//! re-encoded to the canonical delivery format on the way out.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::debug;

use revive_models::ImageAsset;

use crate::error::{ProviderError, ProviderResult};

/// Limits applied during normalization.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeLimits {
    /// Longest allowed edge in pixels
    pub max_dimension: u32,
    /// Ceiling on the encoded payload in bytes
    pub max_bytes: usize,
    /// Starting JPEG quality
    pub quality: u8,
}

impl Default for NormalizeLimits {
    fn default() -> Self {
        Self {
            max_dimension: 2048,
            max_bytes: 4 * 1024 * 1024,
            quality: 90,
        }
    }
}

/// Lowest quality the ladder will try before giving up.
const MIN_QUALITY: u8 = 40;

/// Normalize arbitrary image bytes to the canonical delivery format.
///
/// Downscales above `max_dimension` (Lanczos3), then encodes as JPEG,
/// stepping the quality down until the payload fits under `max_bytes`.
/// Pure with respect to its inputs; the original asset is untouched.
pub fn normalize_image(asset: &ImageAsset, limits: NormalizeLimits) -> ProviderResult<ImageAsset> {
    let img = image::load_from_memory(asset.bytes())
        .map_err(|e| ProviderError::validation(format!("Invalid image data: {}", e)))?;

    let (width, height) = img.dimensions();
    let resized = if width.max(height) > limits.max_dimension {
        debug!(width, height, max = limits.max_dimension, "Downscaling image");
        img.resize(limits.max_dimension, limits.max_dimension, FilterType::Lanczos3)
    } else {
        img
    };

    let mut quality = limits.quality;
    loop {
        let encoded = encode_jpeg(&resized, quality)?;
        if encoded.len() <= limits.max_bytes {
            return Ok(ImageAsset::new(encoded, "image/jpeg"));
        }
        if quality <= MIN_QUALITY {
            return Err(ProviderError::validation(format!(
                "Image cannot be reduced under {} bytes",
                limits.max_bytes
            )));
        }
        quality = quality.saturating_sub(10).max(MIN_QUALITY);
        debug!(quality, "Payload over limit, lowering JPEG quality");
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> ProviderResult<Vec<u8>> {
    let mut output = Vec::new();
    let mut cursor = Cursor::new(&mut output);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
    // JPEG has no alpha channel
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| ProviderError::validation(format!("Failed to encode image: {}", e)))?;
    Ok(output)
}
