//! Mask builder: raw frame in, binary road/lane mask out.
//!
//! Chains the three raster steps every tick performs before any lane
//! search:
//!
//! 1. Resize to the working resolution (bilinear by default).
//! 2. Threshold with the configured [`MaskStrategy`].
//! 3. Drop small connected components (noise filter).
//!
//! The result is a pure function of the frame and configuration.

use serde::{Deserialize, Serialize};

use crate::components::{Connectivity, remove_small_components};
use crate::resize::{ResizeFilter, resize_frame};
use crate::threshold::{MaskStrategy, Thresholder};
use crate::types::{Dimensions, Mask, PipelineError, RgbImage};

/// Configuration for [`build_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Working resolution every frame is resized to.
    pub size: Dimensions,
    /// Resampling filter used for the resize.
    pub resize_filter: ResizeFilter,
    /// How pixels are classified as foreground.
    pub strategy: MaskStrategy,
    /// Components with this many pixels or fewer are removed.
    pub min_component_size: u32,
    /// Adjacency used by the noise filter.
    pub connectivity: Connectivity,
}

impl MaskConfig {
    /// Default working resolution.
    pub const DEFAULT_SIZE: Dimensions = Dimensions::new(640, 360);
    /// Default noise-filter component size floor.
    pub const DEFAULT_MIN_COMPONENT_SIZE: u32 = 30;

    /// Check that the working resolution is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if either axis of `size`
    /// is zero.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.size.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "mask size must be non-empty, got {}x{}",
                self.size.width, self.size.height,
            )));
        }
        Ok(())
    }
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            size: Self::DEFAULT_SIZE,
            resize_filter: ResizeFilter::default(),
            strategy: MaskStrategy::default(),
            min_component_size: Self::DEFAULT_MIN_COMPONENT_SIZE,
            connectivity: Connectivity::default(),
        }
    }
}

/// Output of [`build_mask`].
#[derive(Debug, Clone)]
pub struct MaskOutput {
    /// The filtered `{0, 1}` mask at working resolution.
    pub mask: Mask,
    /// The frame resized to working resolution (used for overlays).
    pub resized: RgbImage,
}

/// Build the binary road/lane mask for one frame.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyFrame`] if `frame` has no pixels.
/// Returns [`PipelineError::InvalidConfig`] if the working size is empty.
pub fn build_mask(frame: &RgbImage, config: &MaskConfig) -> Result<MaskOutput, PipelineError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(PipelineError::EmptyFrame);
    }
    config.validate()?;

    let resized = resize_frame(frame, config.size, config.resize_filter);
    let raw = config.strategy.threshold(&resized);
    let mask = remove_small_components(&raw, config.min_component_size, config.connectivity);

    Ok(MaskOutput { mask, resized })
}
