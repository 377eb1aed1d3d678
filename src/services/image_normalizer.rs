//! Converts uploaded photos into the canonical stored form: an upright, opaque RGB JPEG.

use exif::{In, Reader as ExifReader, Tag};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

use crate::models::CanonicalImage;

pub const CANONICAL_JPEG_QUALITY: u8 = 85;

/// Largest accepted width or height, in pixels
pub const MAX_IMAGE_DIMENSION: u32 = 12_000;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unsupported image format{}", .0.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    UnsupportedFormat(Option<String>),

    #[error("corrupt image: {0}")]
    CorruptImage(String),
}

/// Detect the container format from content. Only formats accepted for photos are returned.
pub fn sniff_format(raw: &[u8]) -> Result<ImageFormat, NormalizeError> {
    let Some(kind) = infer::get(raw) else {
        return Err(NormalizeError::UnsupportedFormat(None));
    };

    match kind.mime_type() {
        "image/jpeg" => Ok(ImageFormat::Jpeg),
        "image/png" => Ok(ImageFormat::Png),
        "image/gif" => Ok(ImageFormat::Gif),
        "image/webp" => Ok(ImageFormat::WebP),
        other => Err(NormalizeError::UnsupportedFormat(Some(other.to_string()))),
    }
}

/// EXIF orientation (1-8) of the primary image, if one is recorded
pub fn read_orientation(raw: &[u8]) -> Option<u16> {
    let exif = ExifReader::new().read_from_container(&mut Cursor::new(raw)).ok()?;
    let field = exif.get_field(Tag::Orientation, In::PRIMARY)?;
    match field.value {
        exif::Value::Short(ref vals) => vals.first().copied(),
        _ => None,
    }
}

/// Turn pixels so the image displays upright without its orientation tag
pub fn apply_orientation(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Decode, orient, flatten and re-encode `raw` as the canonical JPEG.
///
/// Pure function. Nothing is produced on failure.
pub fn normalize_image(raw: &[u8]) -> Result<CanonicalImage, NormalizeError> {
    if raw.is_empty() {
        return Err(NormalizeError::UnsupportedFormat(None));
    }

    let format = sniff_format(raw)?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);

    let mut reader = ImageReader::with_format(Cursor::new(raw), format);
    reader.limits(limits);
    let img = reader
        .decode()
        .map_err(|e| NormalizeError::CorruptImage(e.to_string()))?;

    let img = match read_orientation(raw) {
        Some(orientation) if orientation != 1 => {
            debug!("Applying EXIF orientation {}", orientation);
            apply_orientation(img, orientation)
        }
        _ => img,
    };

    // JPEG has no alpha channel; palette, grayscale and 16-bit images all land on RGB8
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, CANONICAL_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| NormalizeError::CorruptImage(format!("failed to encode JPEG: {}", e)))?;

    Ok(CanonicalImage { bytes, width, height })
}

/// Run `normalize_image` on the blocking pool
pub async fn normalize_image_blocking(raw: Vec<u8>) -> Result<CanonicalImage, NormalizeError> {
    tokio::task::spawn_blocking(move || normalize_image(&raw))
        .await
        .map_err(|e| NormalizeError::CorruptImage(format!("normalization task failed: {}", e)))?
}
