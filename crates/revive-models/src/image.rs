//! Image assets and fingerprints.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the truncated fingerprint in base64url characters.
///
/// 16 characters of base64url encode 96 bits of the SHA-256 digest,
/// which is far beyond collision range for a per-session cache.
const FINGERPRINT_LEN: usize = 16;

/// A derived, stable identifier for an image, used as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of raw image bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut encoded = URL_SAFE_NO_PAD.encode(digest);
        encoded.truncate(FINGERPRINT_LEN);
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable, encoded image payload.
///
/// Every transformation step produces a new asset; the bytes of an
/// existing asset are never mutated. Cloning is cheap (`Bytes` is
/// reference-counted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Bytes,
    mime_type: String,
}

impl ImageAsset {
    /// Create a new asset from encoded bytes and a MIME type.
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Raw encoded bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// MIME type tag, e.g. `image/jpeg`.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size of the encoded payload in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Fingerprint of this asset's bytes.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.bytes)
    }
}
