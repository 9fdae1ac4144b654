//! Validation of uploaded post images.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageError, ImageReader, Limits};
use quill_common::{AppError, AppResult};

/// Largest accepted image, after base64 decoding.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Largest accepted width or height, in pixels.
pub const MAX_IMAGE_DIMENSION: u32 = 8192;

/// Cap on decoder allocations while verifying an image.
const MAX_DECODE_ALLOC: u64 = 64 * 1024 * 1024;

/// Accepted image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageFormat {
    /// Get MIME type for this format.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// Get file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }

    const fn from_detected(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    const fn to_image_crate(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Gif => image::ImageFormat::Gif,
            Self::WebP => image::ImageFormat::WebP,
        }
    }
}

/// A decoded, verified image ready to be stored.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Decode a base64 image (optionally a `data:` URL) and verify it.
///
/// The bytes must be at most [`MAX_IMAGE_BYTES`], sniff as JPEG, PNG, GIF or
/// WebP, and decode cleanly in that format. The header is checked against
/// [`MAX_IMAGE_DIMENSION`] before any pixel buffer is allocated.
pub async fn decode_image(encoded: &str) -> AppResult<ImageUpload> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };

    // 4 base64 chars per 3 bytes
    if payload.len() / 4 * 3 > MAX_IMAGE_BYTES + 3 {
        return Err(image_too_large());
    }

    let data = STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::Validation(format!("Image is not valid base64: {e}")))?;

    if data.len() > MAX_IMAGE_BYTES {
        return Err(image_too_large());
    }

    let format = image::guess_format(&data)
        .ok()
        .and_then(ImageFormat::from_detected)
        .ok_or_else(|| {
            AppError::Validation("Image must be a JPEG, PNG, GIF or WebP file".to_string())
        })?;

    tokio::task::spawn_blocking(move || {
        let mut limits = Limits::default();
        limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
        limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
        limits.max_alloc = Some(MAX_DECODE_ALLOC);

        let mut reader = ImageReader::with_format(Cursor::new(&data), format.to_image_crate());
        reader.limits(limits);

        let decoded = reader.decode().map_err(|e| match e {
            ImageError::Limits(_) => AppError::Validation(format!(
                "Image exceeds {MAX_IMAGE_DIMENSION}x{MAX_IMAGE_DIMENSION} pixels"
            )),
            e => AppError::Validation(format!("Image could not be decoded: {e}")),
        })?;

        Ok(ImageUpload {
            width: decoded.width(),
            height: decoded.height(),
            data,
            format,
        })
    })
    .await
    .map_err(|e| AppError::Internal(format!("Image decoding task failed: {e}")))?
}

fn image_too_large() -> AppError {
    AppError::Validation(format!(
        "Image exceeds the {} MiB limit",
        MAX_IMAGE_BYTES / (1024 * 1024)
    ))
}
