//! Crop planning for aspect-ratio conversion.
//!
//! Pure geometry, no I/O. The plan is validated here so an out-of-frame
//! rectangle never reaches the encoder.

use serde::{Deserialize, Serialize};
use std::fmt;

use shorts_models::ASPECT_TOLERANCE;

use crate::error::{TransformError, TransformResult};

/// A pixel rectangle inside a source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub width: u32,
    pub height: u32,
    /// Left edge offset
    pub x: u32,
    /// Top edge offset
    pub y: u32,
}

impl CropRect {
    /// FFmpeg `crop` filter expression.
    pub fn to_filter(&self) -> String {
        format!("crop={}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// True if the rectangle lies entirely inside a `width` x `height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

impl fmt::Display for CropRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Plan a centered crop of a `width` x `height` frame towards `target` (w/h).
///
/// Returns `Ok(None)` when the source ratio is already within
/// [`ASPECT_TOLERANCE`] of the target.
pub fn plan_crop(width: u32, height: u32, target: f64) -> TransformResult<Option<CropRect>> {
    if width == 0 || height == 0 {
        return Err(TransformError::invalid_crop(format!(
            "source frame is degenerate ({}x{})",
            width, height
        )));
    }
    if !(target.is_finite() && target > 0.0) {
        return Err(TransformError::invalid_crop(format!(
            "target ratio must be positive, got {}",
            target
        )));
    }

    let (w, h) = (width as i64, height as i64);
    let current = width as f64 / height as f64;
    if (current - target).abs() <= ASPECT_TOLERANCE {
        return Ok(None);
    }

    let (crop_w, crop_h) = if current > target {
        // Too wide: keep full height
        ((h as f64 * target).round() as i64, h)
    } else {
        // Too tall: keep full width
        (w, (w as f64 / target).round() as i64)
    };
    // libx264 rejects odd sizes in yuv420p.
    let crop_w = even_floor(crop_w);
    let crop_h = even_floor(crop_h);
    let x = (w - crop_w) / 2;
    let y = (h - crop_h) / 2;

    if crop_w <= 0 || crop_h <= 0 || x < 0 || y < 0 || x + crop_w > w || y + crop_h > h {
        return Err(TransformError::invalid_crop(format!(
            "planned {}x{} at ({}, {}) does not fit {}x{}",
            crop_w, crop_h, x, y, width, height
        )));
    }

    Ok(Some(CropRect {
        width: crop_w as u32,
        height: crop_h as u32,
        x: x as u32,
        y: y as u32,
    }))
}

/// Round down to an even number; yuv420p needs even dimensions.
///
/// Applied after `round(side * ratio)`, so the crop can be one pixel
/// narrower than the exact ratio: 1280x720 at 9:16 gives 404, not 405.
fn even_floor(n: i64) -> i64 {
    if n > 1 {
        n - n % 2
    } else {
        n
    }
}
