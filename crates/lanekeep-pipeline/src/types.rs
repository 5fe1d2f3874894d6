//! Shared types for the lanekeep estimation pipeline.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::estimate::EstimatorConfig;
use crate::mask::MaskConfig;
use crate::steering::SteeringConfig;

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can hand frames to the
/// pipeline without depending on `image` directly.
pub use image::RgbImage;

/// A captured video frame.
///
/// Owned transiently by the tick that captured it and never mutated
/// once handed to the pipeline.
pub type Frame = RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new set of dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Column of the image's horizontal center (`width / 2`).
    #[must_use]
    pub const fn half_width(self) -> u32 {
        self.width / 2
    }

    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Binary road/lane mask with values normalized to exactly `{0, 1}`.
///
/// Produced fresh each tick by [`crate::mask::build_mask`]. Downstream
/// stages only read it; there is no way to mutate a mask in place.
#[derive(Debug, Clone)]
pub struct Mask(GrayImage);

impl Mask {
    /// All-background mask of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// Build a mask by evaluating `f(x, y)` for every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| {
            image::Luma([u8::from(f(x, y))])
        }))
    }

    /// Binarize a grayscale image: any non-zero pixel becomes foreground.
    ///
    /// Accepts both `{0, 1}` and `{0, 255}` encodings.
    #[must_use]
    pub fn from_gray(image: &GrayImage) -> Self {
        Self::from_fn(image.width(), image.height(), |x, y| {
            image.get_pixel(x, y).0[0] != 0
        })
    }

    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.0.width(), self.0.height())
    }

    /// Whether the pixel at `(x, y)` is foreground.
    ///
    /// Out-of-bounds coordinates are background.
    #[must_use]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel_checked(x, y).is_some_and(|p| p.0[0] != 0)
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn foreground_count(&self) -> u64 {
        self.0.as_raw().iter().map(|&v| u64::from(v)).sum()
    }

    /// The underlying `{0, 1}` raster.
    #[must_use]
    pub const fn as_image(&self) -> &GrayImage {
        &self.0
    }

    /// A `{0, 255}` copy suitable for display or PNG export.
    #[must_use]
    pub fn to_display(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            image::Luma([self.0.get_pixel(x, y).0[0].saturating_mul(255)])
        })
    }
}

impl PartialEq for Mask {
    fn eq(&self, other: &Self) -> bool {
        self.0.dimensions() == other.0.dimensions() && self.0.as_raw() == other.0.as_raw()
    }
}

impl Eq for Mask {}

/// Outcome of estimating the lane position in one frame.
///
/// `offset` and `lane_center` are `Some` exactly when `success` is
/// `true`. Created once per tick by [`crate::estimate::estimate`] and
/// consumed immediately by the steering law and failure supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneEstimate {
    /// Whether a lane line was found.
    pub success: bool,
    /// Signed distance from the image center to the lane center
    /// (`lane_center - cx`). Positive means the lane center lies to the
    /// right of the vehicle.
    pub offset: Option<i32>,
    /// Estimated lane-center column in the resized frame.
    pub lane_center: Option<i32>,
    /// Strip column at which the cumulative pixel count first exceeded
    /// the floor.
    pub boundary_index: Option<usize>,
    /// Foreground pixels in the searched strip.
    pub total_pixels: u64,
}

impl LaneEstimate {
    /// A failed estimate carrying whatever search statistics are known.
    #[must_use]
    pub const fn failed(total_pixels: u64, boundary_index: Option<usize>) -> Self {
        Self {
            success: false,
            offset: None,
            lane_center: None,
            boundary_index,
            total_pixels,
        }
    }

    /// A successful estimate.
    #[must_use]
    pub const fn found(
        offset: i32,
        lane_center: i32,
        boundary_index: usize,
        total_pixels: u64,
    ) -> Self {
        Self {
            success: true,
            offset: Some(offset),
            lane_center: Some(lane_center),
            boundary_index: Some(boundary_index),
            total_pixels,
        }
    }
}

/// Configuration for the per-frame pipeline.
///
/// Passed explicitly into every call; nothing in the pipeline keeps
/// process-wide defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Mask building and noise filtering.
    pub mask: MaskConfig,
    /// Strip search and lane geometry.
    pub estimator: EstimatorConfig,
    /// Offset-to-pulse mapping.
    pub steering: SteeringConfig,
}

impl PipelineConfig {
    /// Check every section and the cross-section constraint that the
    /// search band lies inside the resized mask.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// violated constraint.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.mask.validate()?;
        self.estimator.validate()?;
        self.steering.validate()?;
        if self.estimator.y_max > self.mask.size.height {
            return Err(PipelineError::InvalidConfig(format!(
                "search band ends at row {} but the mask is only {} rows tall",
                self.estimator.y_max, self.mask.size.height,
            )));
        }
        Ok(())
    }
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// The input frame has no pixels.
    #[error("input frame is empty")]
    EmptyFrame,

    /// The requested strip has zero width or height.
    #[error("search strip is empty (rows {rows:?}, columns {columns:?})")]
    EmptyStrip {
        /// Requested row range.
        rows: Range<u32>,
        /// Requested column range.
        columns: Range<u32>,
    },

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}
