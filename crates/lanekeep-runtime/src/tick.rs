//! One control tick: capture, estimate, steer, record.
//!
//! A tick never fails. Capture errors, pipeline errors and panics all
//! become a failed tick that counts toward the failure window.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use lanekeep_pipeline::diagnostics::{Clock, TickDiagnostics, process_frame_with_diagnostics};
use lanekeep_pipeline::{LaneEstimate, PipelineConfig, RgbImage, SteerCommand};
use serde::{Deserialize, Serialize};

use crate::collaborators::Drivers;
use crate::state::ControllerState;

/// Per-tick stats published to the visualization sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickStats {
    /// 1-based tick number.
    pub tick: u64,
    /// Whether a lane line was found.
    pub success: bool,
    /// Lateral offset (`lane_center - cx`) when found.
    pub offset: Option<i32>,
    /// Lane-center column when found.
    pub lane_center: Option<i32>,
    /// Strip column where the pixel floor was crossed.
    pub boundary_index: Option<usize>,
    /// Foreground pixels in the searched strip.
    pub total_pixels: u64,
    /// Column the search started from.
    pub anchor: u32,
    /// Steering pulse issued, if any.
    pub command: Option<SteerCommand>,
    /// Whether this tick triggered the recovery maneuver.
    pub recovery: bool,
    /// Stage timings, absent when the pipeline did not run.
    pub diagnostics: Option<TickDiagnostics>,
}

/// [`Clock`] backed by `web_time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl Clock for WallClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// What the pipeline made of one tick, before bookkeeping.
#[derive(Debug)]
pub(crate) struct TickEvaluation {
    estimate: LaneEstimate,
    anchor: u32,
    command: Option<SteerCommand>,
    overlay: Option<RgbImage>,
    diagnostics: Option<TickDiagnostics>,
}

impl TickEvaluation {
    fn failed(anchor: u32) -> Self {
        Self {
            estimate: LaneEstimate::failed(0, None),
            anchor,
            command: None,
            overlay: None,
            diagnostics: None,
        }
    }

    pub(crate) const fn success(&self) -> bool {
        self.estimate.success
    }

    /// Split into published stats and the overlay image.
    pub(crate) fn into_stats(self, tick: u64, recovery: bool) -> (TickStats, Option<RgbImage>) {
        let stats = TickStats {
            tick,
            success: self.estimate.success,
            offset: self.estimate.offset,
            lane_center: self.estimate.lane_center,
            boundary_index: self.estimate.boundary_index,
            total_pixels: self.estimate.total_pixels,
            anchor: self.anchor,
            command: self.command,
            recovery,
            diagnostics: self.diagnostics,
        };
        (stats, self.overlay)
    }
}

/// Capture a frame, run the pipeline and actuate.
///
/// The search anchor moves only once the tick has got past actuation,
/// so a tick that panics leaves it where it was.
fn evaluate(
    state: &mut ControllerState,
    drivers: &mut Drivers,
    config: &PipelineConfig,
) -> TickEvaluation {
    let anchor = state.previous_center;

    let frame = match drivers.frames.capture_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "frame capture failed");
            return TickEvaluation::failed(anchor);
        }
    };

    let (outcome, diagnostics) =
        match process_frame_with_diagnostics(&frame, config, Some(anchor), &WallClock) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "pipeline failed on frame");
                return TickEvaluation::failed(anchor);
            }
        };

    if let Some(command) = outcome.command.filter(SteerCommand::is_actuation) {
        tracing::debug!(
            direction = %command.direction,
            hold_ms = command.hold.as_secs_f64() * 1000.0,
            "steering"
        );
        if let Err(e) = drivers.actuator.actuate(&command) {
            tracing::warn!(error = %e, "actuator failed");
        }
    }
    state.previous_center = outcome.path.previous_center;

    TickEvaluation {
        estimate: outcome.path.estimate,
        anchor,
        command: outcome.command,
        overlay: outcome.path.overlay,
        diagnostics: Some(diagnostics),
    }
}

/// Run one tick and record it in the failure window.
///
/// Returns the evaluation and whether recovery is due.
pub(crate) fn run_tick(
    state: &mut ControllerState,
    drivers: &mut Drivers,
    config: &PipelineConfig,
) -> (TickEvaluation, bool) {
    let anchor = state.previous_center;
    let evaluation = panic::catch_unwind(AssertUnwindSafe(|| {
        evaluate(state, drivers, config)
    }))
    .unwrap_or_else(|payload| {
        tracing::error!(panic = panic_message(payload.as_ref()), "tick panicked");
        TickEvaluation::failed(anchor)
    });

    let recovery_due = state.record(evaluation.success());
    tracing::debug!(
        tick = state.ticks,
        success = evaluation.success(),
        offset = ?evaluation.estimate.offset,
        recovery_due,
        "tick"
    );
    (evaluation, recovery_due)
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
