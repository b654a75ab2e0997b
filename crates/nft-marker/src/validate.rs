//! Cheap checks that run before any pixel work or filesystem write.

use crate::config::{MarkerConfig, MIN_IMAGE_SIDE};
use crate::MarkerError;
use image::ImageReader;
use std::io::Cursor;

/// Longest accepted marker identifier, in bytes.
pub const MAX_MARKER_ID_LEN: usize = 128;

/// Marker ids name a directory, so only `[A-Za-z0-9_-]` is allowed.
pub fn validate_marker_id(id: &str) -> Result<(), MarkerError> {
    let reason = if id.is_empty() {
        "must not be empty"
    } else if id.len() > MAX_MARKER_ID_LEN {
        "longer than 128 bytes"
    } else if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        "only ASCII letters, digits, '-' and '_' are allowed"
    } else {
        return Ok(());
    };
    Err(MarkerError::InvalidMarkerId {
        id: id.to_owned(),
        reason,
    })
}

/// Enforce the size window: minimum side, maximum side, maximum area, in
/// that order.
pub fn validate_dimensions(width: u32, height: u32, cfg: &MarkerConfig) -> Result<(), MarkerError> {
    if width < MIN_IMAGE_SIDE || height < MIN_IMAGE_SIDE {
        return Err(MarkerError::TooSmall {
            width,
            height,
            min: MIN_IMAGE_SIDE,
        });
    }
    if width > cfg.max_image_size || height > cfg.max_image_size {
        return Err(MarkerError::TooLarge {
            width,
            height,
            max: cfg.max_image_size,
        });
    }
    let area = width as u64 * height as u64;
    if area > cfg.max_image_area {
        return Err(MarkerError::AreaExceeded {
            width,
            height,
            area,
            max_area: cfg.max_image_area,
        });
    }
    Ok(())
}

/// [`validate_dimensions`] for in-memory buffers; a side that does not fit
/// in `u32` is reported as [`MarkerError::TooLarge`].
pub fn validate_view_dimensions(
    width: usize,
    height: usize,
    cfg: &MarkerConfig,
) -> Result<(), MarkerError> {
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(width), Ok(height)) => validate_dimensions(width, height, cfg),
        _ => Err(MarkerError::TooLarge {
            width: u32::try_from(width).unwrap_or(u32::MAX),
            height: u32::try_from(height).unwrap_or(u32::MAX),
            max: cfg.max_image_size,
        }),
    }
}

/// Widest decoded pixel the `image` crate produces (RGBA, 32-bit float).
const MAX_DECODED_BYTES_PER_PIXEL: u64 = 16;

/// Allocation ceiling for decoding: enough for any pixel format at the
/// configured maximum area, never below the `image` crate's own default.
pub fn decode_alloc_limit(cfg: &MarkerConfig) -> u64 {
    let default = image::Limits::default().max_alloc.unwrap_or(512 * 1024 * 1024);
    cfg.max_image_area
        .saturating_mul(MAX_DECODED_BYTES_PER_PIXEL)
        .max(default)
}

/// Read width and height from the image header without decoding pixels.
pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32), MarkerError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| MarkerError::Decode(image::ImageError::IoError(e)))?
        .into_dimensions()
        .map_err(MarkerError::Decode)
}

/// Probe, validate, then fully decode to 8-bit luma.
///
/// Oversized images are rejected from their header alone.
pub fn decode_validated(bytes: &[u8], cfg: &MarkerConfig) -> Result<image::GrayImage, MarkerError> {
    let (width, height) = probe_dimensions(bytes)?;
    validate_dimensions(width, height, cfg)?;
    let mut limits = image::Limits::default();
    limits.max_image_width = Some(cfg.max_image_size);
    limits.max_image_height = Some(cfg.max_image_size);
    limits.max_alloc = Some(decode_alloc_limit(cfg));

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| MarkerError::Decode(image::ImageError::IoError(e)))?;
    reader.limits(limits);
    let decoded = reader.decode().map_err(MarkerError::Decode)?;
    Ok(decoded.to_luma8())
}
