//! Image capture adapter
//!
//! Turns a camera shot or picked file into the validated, encoded payload the
//! ingredient-scan flow sends through the gateway.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::path::Path;

use crate::error::{Error, Result};

/// Largest accepted image payload (8 MiB raw)
pub const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// A validated, encoded image ready for an ingredient-scan request
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// MIME type of the source image
    pub media_type: String,
    /// Base64-encoded image bytes
    pub data: String,
    /// Source reference for display alongside the scan message
    pub source: String,
}

/// Capture an image from a file on disk
pub fn from_file(path: &Path) -> Result<CapturedImage> {
    let media_type = media_type_for(path).ok_or_else(|| {
        Error::Capture(format!(
            "unsupported image type: {}",
            path.display()
        ))
    })?;

    let bytes = std::fs::read(path)?;
    let source = format!("file://{}", path.display());
    from_bytes(&bytes, media_type, source)
}

/// Capture an image from raw bytes (camera capture path)
pub fn from_bytes(
    bytes: &[u8],
    media_type: impl Into<String>,
    source: impl Into<String>,
) -> Result<CapturedImage> {
    if bytes.is_empty() {
        return Err(Error::Capture("image is empty".to_string()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(Error::Capture(format!(
            "image too large: {} bytes (max {})",
            bytes.len(),
            MAX_IMAGE_BYTES
        )));
    }

    Ok(CapturedImage {
        media_type: media_type.into(),
        data: BASE64.encode(bytes),
        source: source.into(),
    })
}

/// Map a file extension to its MIME type. Unknown extensions are rejected
/// rather than guessed.
fn media_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_mapping() {
        assert_eq!(
            media_type_for(Path::new("label.JPG")),
            Some("image/jpeg")
        );
        assert_eq!(media_type_for(Path::new("label.png")), Some("image/png"));
        assert_eq!(media_type_for(Path::new("label.gif")), None);
        assert_eq!(media_type_for(Path::new("label")), None);
    }

    #[test]
    fn test_from_bytes_encodes() {
        let image = from_bytes(b"fake-image-bytes", "image/png", "camera").unwrap();
        assert_eq!(image.media_type, "image/png");
        assert_eq!(image.source, "camera");
        assert_eq!(image.data, BASE64.encode(b"fake-image-bytes"));
    }

    #[test]
    fn test_empty_bytes_rejected() {
        assert!(from_bytes(&[], "image/png", "camera").is_err());
    }

    #[test]
    fn test_oversized_image_rejected() {
        let big = vec![0u8; MAX_IMAGE_BYTES + 1];
        assert!(from_bytes(&big, "image/jpeg", "camera").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label.jpg");
        std::fs::write(&path, b"jpeg-bytes").unwrap();

        let image = from_file(&path).unwrap();
        assert_eq!(image.media_type, "image/jpeg");
        assert!(image.source.starts_with("file://"));

        let unsupported = dir.path().join("label.bmp");
        std::fs::write(&unsupported, b"bmp-bytes").unwrap();
        assert!(from_file(&unsupported).is_err());
    }
}
