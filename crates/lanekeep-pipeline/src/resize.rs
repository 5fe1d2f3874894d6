//! Frame resizing to the fixed working resolution.
//!
//! Every captured frame is resized to the configured working size
//! (canonically 640x360) before thresholding, so all downstream pixel
//! constants (search band rows, lane width) are expressed in one
//! coordinate system regardless of the capture window size.
//!
//! Unlike a longest-axis downsample, the aspect ratio is not preserved:
//! the target size is exact.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, RgbImage};

/// Resampling filter used when resizing.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom).
    CatmullRom,
    /// Lanczos with 3 lobes.
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Resize a frame to exactly `size`.
///
/// Frames that already have the target size are cloned without
/// resampling, so the result is pixel-identical to the input.
#[must_use = "returns the resized frame"]
pub fn resize_frame(frame: &RgbImage, size: Dimensions, filter: ResizeFilter) -> RgbImage {
    if frame.dimensions() == (size.width, size.height) {
        return frame.clone();
    }
    image::imageops::resize(frame, size.width, size.height, filter.to_image_filter())
}
