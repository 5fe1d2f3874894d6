//! Tick diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for tuning
//! the mask thresholds, search band and steering gains. Every call to
//! [`process_frame_with_diagnostics`] collects them alongside the
//! pipeline results.
//!
//! Timestamps come from a caller-supplied [`Clock`] so the pipeline
//! itself stays free of platform time sources.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::steering::{SteerDirection, compute_command};
use crate::types::{Frame, PipelineConfig, PipelineError};
use crate::{FrameOutcome, estimate, mask};

/// Serde support for `std::time::Duration` as fractional seconds.
pub mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        from_secs_rounded(secs).ok_or_else(|| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }

    /// Convert fractional seconds to a `Duration`, rounding to the
    /// nearest nanosecond so decimal values survive a round trip.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn from_secs_rounded(secs: f64) -> Option<Duration> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        let nanos = (secs * 1e9).round();
        if nanos >= u64::MAX as f64 {
            return None;
        }
        Some(Duration::from_nanos(nanos as u64))
    }
}

/// Source of timestamps for stage timing.
///
/// Native callers wrap `std::time::Instant`; tests can supply a fake.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Current point in time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single tick of the pipeline.
///
/// Steering only runs when the estimate succeeds, so its stage is
/// `None` on failed ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickDiagnostics {
    /// Stage 1: resize, threshold, noise filter.
    pub mask: StageDiagnostics,
    /// Stage 2: strip search and lane geometry.
    pub estimate: StageDiagnostics,
    /// Stage 3: steering law (only on a successful estimate).
    pub steering: Option<StageDiagnostics>,
    /// Total wall-clock duration of the tick's pipeline work (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the tick outcome.
    pub summary: TickSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Mask builder metrics.
    Mask {
        /// Captured frame width in pixels.
        input_width: u32,
        /// Captured frame height in pixels.
        input_height: u32,
        /// Working width after resize.
        width: u32,
        /// Working height after resize.
        height: u32,
        /// Foreground pixels surviving the noise filter.
        foreground_pixels: u64,
    },
    /// Path estimator metrics.
    Estimate {
        /// Column the leftward search started from.
        anchor: u32,
        /// Foreground pixels in the searched strip.
        total_pixels: u64,
        /// Strip column where the running total exceeded the floor.
        boundary_index: Option<usize>,
        /// Estimated lane-center column.
        lane_center: Option<i32>,
    },
    /// Steering law metrics.
    Steering {
        /// Lateral offset fed to the law.
        offset: i32,
        /// Resulting direction.
        direction: SteerDirection,
        /// Hold duration in seconds.
        hold_secs: f64,
    },
}

/// High-level summary of a tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickSummary {
    /// Whether a lane line was found.
    pub success: bool,
    /// Lateral offset when found.
    pub offset: Option<i32>,
    /// Anchor for the next tick.
    pub previous_center: u32,
}

impl TickDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Tick Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        let mut stages: Vec<(&str, &StageDiagnostics)> =
            vec![("Mask", &self.mask), ("Estimate", &self.estimate)];
        if let Some(ref s) = self.steering {
            stages.push(("Steering", s));
        }

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        let outcome = match self.summary.offset {
            Some(offset) if self.summary.success => format!("offset {offset:+}"),
            _ => "no lane line".to_string(),
        };
        lines.push(format!(
            "Outcome: {outcome}  |  Next anchor: {}",
            self.summary.previous_center,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Mask {
            input_width,
            input_height,
            width,
            height,
            foreground_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *width > 0 && *height > 0 {
                *foreground_pixels as f64 / (f64::from(*width) * f64::from(*height)) * 100.0
            } else {
                0.0
            };
            format!(
                "{input_width}x{input_height} -> {width}x{height} fg={foreground_pixels} ({density:.1}%)",
            )
        }
        StageMetrics::Estimate {
            anchor,
            total_pixels,
            boundary_index,
            lane_center,
        } => {
            let boundary = boundary_index.map_or_else(|| "-".to_string(), |b| b.to_string());
            let center = lane_center.map_or_else(|| "-".to_string(), |c| c.to_string());
            format!("anchor={anchor} pixels={total_pixels} boundary={boundary} center={center}")
        }
        StageMetrics::Steering {
            offset,
            direction,
            hold_secs,
        } => format!("offset={offset:+} {direction} hold={:.1}ms", hold_secs * 1000.0),
    }
}

/// Run the per-frame pipeline, timing every stage with `clock`.
///
/// Produces the same [`FrameOutcome`] as [`crate::process_frame`].
///
/// # Errors
///
/// Returns the same errors as [`crate::process_frame`].
pub fn process_frame_with_diagnostics<C: Clock>(
    frame: &Frame,
    config: &PipelineConfig,
    previous_center: Option<u32>,
    clock: &C,
) -> Result<(FrameOutcome, TickDiagnostics), PipelineError> {
    config.validate()?;
    let start = clock.now();

    let t = clock.now();
    let mask_output = mask::build_mask(frame, &config.mask)?;
    let mask_diag = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Mask {
            input_width: frame.width(),
            input_height: frame.height(),
            width: mask_output.mask.width(),
            height: mask_output.mask.height(),
            foreground_pixels: mask_output.mask.foreground_count(),
        },
    };

    let t = clock.now();
    let path = estimate::estimate(
        &mask_output.resized,
        &mask_output.mask,
        &config.estimator,
        previous_center,
    )?;
    let estimate_diag = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Estimate {
            anchor: path.anchor,
            total_pixels: path.estimate.total_pixels,
            boundary_index: path.estimate.boundary_index,
            lane_center: path.estimate.lane_center,
        },
    };

    let (command, steering_diag) = match path.estimate.offset {
        Some(offset) => {
            let t = clock.now();
            let command = compute_command(offset, &config.steering);
            let diag = StageDiagnostics {
                duration: clock.elapsed(&t),
                metrics: StageMetrics::Steering {
                    offset,
                    direction: command.direction,
                    hold_secs: command.hold.as_secs_f64(),
                },
            };
            (Some(command), Some(diag))
        }
        None => (None, None),
    };

    let summary = TickSummary {
        success: path.estimate.success,
        offset: path.estimate.offset,
        previous_center: path.previous_center,
    };
    let diagnostics = TickDiagnostics {
        mask: mask_diag,
        estimate: estimate_diag,
        steering: steering_diag,
        total_duration: clock.elapsed(&start),
        summary,
    };

    Ok((
        FrameOutcome {
            mask_output,
            path,
            command,
        },
        diagnostics,
    ))
}
