//! Request handlers.

pub mod analyze;
pub mod edit;
pub mod health;
pub mod translate;
pub mod video;

pub use health::{health, ready};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use revive_models::ImageAsset;

use crate::error::ApiError;

/// Decode a base64 image payload into an asset.
///
/// Accepts both a bare base64 string and a `data:` URL; the MIME type
/// defaults to JPEG when the payload does not declare one.
pub(crate) fn decode_image(data: &str, mime_type: Option<&str>) -> Result<ImageAsset, ApiError> {
    let (payload, data_url_mime) = match data.strip_prefix("data:") {
        Some(rest) => {
            let (header, body) = rest
                .split_once(";base64,")
                .ok_or_else(|| ApiError::bad_request("Malformed data URL"))?;
            (body, Some(header.to_string()))
        }
        None => (data, None),
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ApiError::bad_request(format!("Invalid base64 image: {e}")))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("Empty image payload"));
    }

    let mime = mime_type
        .map(|s| s.to_string())
        .or(data_url_mime)
        .unwrap_or_else(|| "image/jpeg".to_string());
    Ok(ImageAsset::new(bytes, mime))
}

/// Encode an asset for a JSON response body.
pub(crate) fn encode_image(asset: &ImageAsset) -> String {
    STANDARD.encode(asset.bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bare_base64() {
        let encoded = STANDARD.encode(b"image bytes");
        let asset = decode_image(&encoded, None).unwrap();
        assert_eq!(&asset.bytes()[..], b"image bytes");
        assert_eq!(asset.mime_type(), "image/jpeg");
    }

    #[test]
    fn test_decode_data_url() {
        let encoded = format!("data:image/png;base64,{}", STANDARD.encode(b"png bytes"));
        let asset = decode_image(&encoded, None).unwrap();
        assert_eq!(asset.mime_type(), "image/png");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_image("not!!base64", None).is_err());
        assert!(decode_image("", None).is_err());
    }

    #[test]
    fn test_explicit_mime_wins() {
        let encoded = format!("data:image/png;base64,{}", STANDARD.encode(b"bytes"));
        let asset = decode_image(&encoded, Some("image/webp")).unwrap();
        assert_eq!(asset.mime_type(), "image/webp");
    }
}
