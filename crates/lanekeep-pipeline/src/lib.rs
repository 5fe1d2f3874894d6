//! lanekeep-pipeline: Pure per-frame lane estimation pipeline (sans-IO).
//!
//! Converts a captured video frame into a steering pulse through:
//! resize -> threshold -> noise filter -> strip search -> lane geometry
//! -> steering law.
//!
//! This crate has **no I/O dependencies** and no clocks, threads or
//! global state. It operates on in-memory frames and returns structured
//! data. Frame capture, actuation and scheduling live in
//! `lanekeep-runtime`.

pub mod components;
pub mod diagnostics;
pub mod estimate;
pub mod locate;
pub mod mask;
pub mod overlay;
pub mod resize;
pub mod steering;
pub mod supervisor;
pub mod threshold;
pub mod types;

pub use components::Connectivity;
pub use estimate::{EstimatorConfig, PathEstimate};
pub use mask::{MaskConfig, MaskOutput};
pub use resize::ResizeFilter;
pub use steering::{SteerCommand, SteerDirection, SteeringConfig};
pub use supervisor::{FailureSupervisor, SupervisorConfig};
pub use threshold::{HsvBand, MaskStrategy, Thresholder};
pub use types::{
    Dimensions, Frame, GrayImage, LaneEstimate, Mask, PipelineConfig, PipelineError, RgbImage,
};

/// Everything one tick of the pipeline produces.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// Filtered mask and the resized frame it was built from.
    pub mask_output: MaskOutput,
    /// Lane estimate, next anchor and optional overlay.
    pub path: PathEstimate,
    /// Steering pulse, present exactly when the estimate succeeded.
    /// A pulse inside the dead-band has direction
    /// [`SteerDirection::None`].
    pub command: Option<SteerCommand>,
}

/// Run the full per-frame pipeline.
///
/// `previous_center` is the anchor returned by the previous tick in
/// [`PathEstimate::previous_center`], or `None` on the first tick.
///
/// # Pipeline steps
///
/// 1. Resize to the working resolution
/// 2. Threshold into a binary mask (pluggable strategy)
/// 3. Remove small connected components
/// 4. Locate the nearest lane line left of the anchor
/// 5. Derive lane center and lateral offset
/// 6. Map the offset to a steering pulse
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails validation.
/// Returns [`PipelineError::EmptyFrame`] if `frame` has no pixels.
/// Returns [`PipelineError::EmptyStrip`] if the search window is empty.
pub fn process_frame(
    frame: &Frame,
    config: &PipelineConfig,
    previous_center: Option<u32>,
) -> Result<FrameOutcome, PipelineError> {
    config.validate()?;

    let mask_output = mask::build_mask(frame, &config.mask)?;
    let path = estimate::estimate(
        &mask_output.resized,
        &mask_output.mask,
        &config.estimator,
        previous_center,
    )?;
    let command = path
        .estimate
        .offset
        .map(|offset| steering::compute_command(offset, &config.steering));

    Ok(FrameOutcome {
        mask_output,
        path,
        command,
    })
}
