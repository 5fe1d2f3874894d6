//! Debug overlay: the mask painted over the search band of the frame.
//!
//! Purely observational; nothing in the control path reads it. The
//! overlay shows:
//!
//! - the band rows replaced by the binary mask (white = foreground),
//! - a red bar over the columns the locator scanned before reaching its
//!   pixel floor, ending at the search anchor,
//! - a green bar at the estimated lane center.

use std::ops::Range;

use image::Rgb;

use crate::types::{Mask, RgbImage};

const FOREGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const SCANNED_FOREGROUND: Rgb<u8> = Rgb([255, 0, 0]);
const SCANNED_BACKGROUND: Rgb<u8> = Rgb([96, 0, 0]);
const LANE_CENTER: Rgb<u8> = Rgb([0, 255, 0]);

/// Half-width of the lane-center marker in pixels.
const CENTER_MARK_HALF_WIDTH: i32 = 1;

/// Positions highlighted on a successful search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayMarks {
    /// Column the leftward search started from (exclusive).
    pub anchor: u32,
    /// Number of columns scanned before the boundary.
    pub searched: u32,
    /// Estimated lane-center column (may lie outside the image).
    pub lane_center: i32,
}

/// Render the overlay for one tick.
///
/// Rows outside the frame are ignored, as are marks that fall outside
/// the image.
#[must_use = "returns the rendered overlay"]
pub fn render_overlay(
    frame: &RgbImage,
    mask: &Mask,
    rows: Range<u32>,
    marks: Option<OverlayMarks>,
) -> RgbImage {
    let mut out = frame.clone();
    let rows = rows.start.min(out.height())..rows.end.min(out.height());

    let scanned = marks.map_or(0..0, |m| m.anchor.saturating_sub(m.searched)..m.anchor);
    let center = marks.map(|m| m.lane_center);

    for y in rows {
        for x in 0..out.width() {
            let fg = mask.is_foreground(x, y);
            let on_center = center.is_some_and(|c| {
                (i64::from(x) - i64::from(c)).abs() <= i64::from(CENTER_MARK_HALF_WIDTH)
            });
            let color = if on_center {
                LANE_CENTER
            } else if scanned.contains(&x) {
                if fg { SCANNED_FOREGROUND } else { SCANNED_BACKGROUND }
            } else if fg {
                FOREGROUND
            } else {
                BACKGROUND
            };
            out.put_pixel(x, y, color);
        }
    }

    out
}
