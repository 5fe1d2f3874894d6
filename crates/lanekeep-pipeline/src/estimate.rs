//! Path estimator: lateral offset of the vehicle from the lane center.
//!
//! One call per tick. The search window is the band `[y_min, y_max)`
//! of the mask, restricted to columns `[0, anchor)` where `anchor` is
//! the previous tick's lane center (image half-width on the first
//! tick). The strip's columns are reversed so the locator scans
//! leftward from the anchor and stops at the first lane line it
//! accumulates enough pixels from.
//!
//! Geometry, in resized-image columns:
//!
//! ```text
//! line        = anchor - 1 - mean_offset
//! lane_center = round(line + lane_width / 2)
//! offset      = lane_center - cx
//! ```
//!
//! A positive offset means the lane center lies right of the image
//! center, i.e. the vehicle sits left of the lane center and must steer
//! right.
//!
//! On success the next anchor is the new lane center, which keeps the
//! whole line inside the next window while it does not move. On failure
//! the anchor is left unchanged.

use serde::{Deserialize, Serialize};

use crate::locate::{ColumnOrder, Strip, locate_line};
use crate::overlay::{OverlayMarks, render_overlay};
use crate::types::{LaneEstimate, Mask, PipelineError, RgbImage};

/// Configuration for [`estimate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// First row of the search band (inclusive).
    pub y_min: u32,
    /// Last row of the search band (exclusive).
    pub y_max: u32,
    /// Strips with this many foreground pixels or fewer hold no line.
    pub min_pixels: u64,
    /// Expected lane width in resized-image pixels.
    pub lane_width: u32,
    /// Whether to render the debug overlay.
    pub overlay: bool,
}

impl EstimatorConfig {
    /// Default first band row.
    pub const DEFAULT_Y_MIN: u32 = 260;
    /// Default band end row.
    pub const DEFAULT_Y_MAX: u32 = 275;
    /// Default pixel floor.
    pub const DEFAULT_MIN_PIXELS: u64 = 60;
    /// Default lane width.
    pub const DEFAULT_LANE_WIDTH: u32 = 309;

    /// Check the search band and lane width.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the band is empty or
    /// the lane width is zero.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.y_min >= self.y_max {
            return Err(PipelineError::InvalidConfig(format!(
                "search band rows {}..{} are empty",
                self.y_min, self.y_max,
            )));
        }
        if self.lane_width == 0 {
            return Err(PipelineError::InvalidConfig(
                "lane width must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            y_min: Self::DEFAULT_Y_MIN,
            y_max: Self::DEFAULT_Y_MAX,
            min_pixels: Self::DEFAULT_MIN_PIXELS,
            lane_width: Self::DEFAULT_LANE_WIDTH,
            overlay: false,
        }
    }
}

/// Output of [`estimate`].
#[derive(Debug, Clone)]
pub struct PathEstimate {
    /// Lane position for this tick.
    pub estimate: LaneEstimate,
    /// Anchor column to pass as `previous_center` on the next tick.
    pub previous_center: u32,
    /// Column the search started from this tick.
    pub anchor: u32,
    /// Debug overlay, when enabled in the configuration.
    pub overlay: Option<RgbImage>,
}

/// Estimate the vehicle's lateral offset from the lane center.
///
/// `frame` is the resized frame the mask was built from; it is only
/// read for the overlay. `previous_center` of `None` starts the search
/// at the image half-width.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyStrip`] if the search band or window
/// falls outside the mask.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn estimate(
    frame: &RgbImage,
    mask: &Mask,
    config: &EstimatorConfig,
    previous_center: Option<u32>,
) -> Result<PathEstimate, PipelineError> {
    let width = mask.width();
    let cx = mask.dimensions().half_width();
    let anchor = previous_center.unwrap_or(cx).min(width);

    let strip = Strip::new(
        mask,
        config.y_min..config.y_max,
        0..anchor,
        ColumnOrder::Reversed,
    )?;
    let search = locate_line(&strip, config.min_pixels);

    let found = search.boundary_index.zip(search.mean_offset);
    let (estimate, next_anchor, marks) = match found {
        Some((boundary, mean_offset)) => {
            let line = f64::from(anchor) - 1.0 - mean_offset;
            let lane_center = (line + f64::from(config.lane_width) / 2.0).round() as i32;
            let offset = lane_center - cx as i32;
            // Keep at least one column in the next window.
            let next = lane_center.clamp(1, width.max(1) as i32) as u32;
            tracing::trace!(anchor, line, lane_center, offset, "lane line found");
            (
                LaneEstimate::found(offset, lane_center, boundary, search.total_pixels),
                next,
                Some(OverlayMarks {
                    anchor,
                    searched: boundary as u32,
                    lane_center,
                }),
            )
        }
        None => {
            tracing::trace!(
                anchor,
                total_pixels = search.total_pixels,
                "no lane line in strip"
            );
            (
                LaneEstimate::failed(search.total_pixels, search.boundary_index),
                anchor,
                None,
            )
        }
    };

    let overlay = config
        .overlay
        .then(|| render_overlay(frame, mask, config.y_min..config.y_max, marks));

    Ok(PathEstimate {
        estimate,
        previous_center: next_anchor,
        anchor,
        overlay,
    })
}
