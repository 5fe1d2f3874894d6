//! Color thresholding: turn a resized frame into a binary mask.
//!
//! This module defines the [`Thresholder`] trait for pluggable
//! thresholding strategies and the [`MaskStrategy`] enum for selecting
//! one from configuration.
//!
//! # Strategy pattern
//!
//! Two strategies are supported:
//!
//! - [`MaskStrategy::HsvRange`]: convert to hue/saturation/value and keep
//!   pixels whose three channels all fall inside an inclusive band. The
//!   default band selects near-white road markings (low saturation,
//!   high value).
//! - [`MaskStrategy::Grayscale`]: keep pixels whose luminance strictly
//!   exceeds a fixed threshold.
//!
//! HSV values use the common 8-bit encoding: hue in `[0, 180)` (degrees
//! halved), saturation and value in `[0, 255]`.

use serde::{Deserialize, Serialize};

use crate::types::{Mask, RgbImage};

/// Inclusive per-channel HSV band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvBand {
    /// Lower bound `[h, s, v]`, inclusive.
    pub lower: [u8; 3],
    /// Upper bound `[h, s, v]`, inclusive.
    pub upper: [u8; 3],
}

impl HsvBand {
    /// Near-white markings: any hue, saturation at most 30, value at least 170.
    pub const WHITE_MARKINGS: Self = Self {
        lower: [0, 0, 170],
        upper: [255, 30, 255],
    };

    /// Whether an HSV triple falls inside the band on every channel.
    #[must_use]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| self.lower[c] <= hsv[c] && hsv[c] <= self.upper[c])
    }
}

impl Default for HsvBand {
    fn default() -> Self {
        Self::WHITE_MARKINGS
    }
}

/// Selects which thresholding strategy builds the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaskStrategy {
    /// Foreground iff every HSV channel lies inside the band.
    HsvRange(HsvBand),
    /// Foreground iff luminance is strictly greater than `threshold`.
    Grayscale {
        /// Intensity threshold (exclusive).
        threshold: u8,
    },
}

impl MaskStrategy {
    /// Default grayscale intensity threshold.
    pub const DEFAULT_GRAY_THRESHOLD: u8 = 175;
}

impl Default for MaskStrategy {
    fn default() -> Self {
        Self::HsvRange(HsvBand::default())
    }
}

/// Trait for thresholding strategies.
///
/// Input: a color frame. Output: a `{0, 1}` mask of the same size.
pub trait Thresholder {
    /// Classify every pixel of `frame` as foreground or background.
    fn threshold(&self, frame: &RgbImage) -> Mask;
}

impl Thresholder for MaskStrategy {
    fn threshold(&self, frame: &RgbImage) -> Mask {
        match *self {
            Self::HsvRange(band) => Mask::from_fn(frame.width(), frame.height(), |x, y| {
                band.contains(rgb_to_hsv(frame.get_pixel(x, y).0))
            }),
            Self::Grayscale { threshold } => {
                let gray = image::imageops::grayscale(frame);
                Mask::from_fn(gray.width(), gray.height(), |x, y| {
                    gray.get_pixel(x, y).0[0] > threshold
                })
            }
        }
    }
}

/// Convert an 8-bit RGB pixel to 8-bit HSV.
///
/// Hue is halved into `[0, 180)` so it fits a byte; saturation is scaled
/// by the value channel into `[0, 255]`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::many_single_char_names
)]
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;

    let s = if v > 0.0 { 255.0 * delta / v } else { 0.0 };

    let h = if delta <= 0.0 {
        0.0
    } else if (v - r).abs() < f32::EPSILON {
        60.0 * (g - b) / delta
    } else if (v - g).abs() < f32::EPSILON {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    // 360 degrees wraps to hue 0 after halving and rounding.
    let h8 = ((h / 2.0).round() as u32 % 180) as u8;
    [h8, s.round() as u8, v as u8]
}
