//! Boundary between the controller and the outside world.
//!
//! The scheduler only ever talks to the simulator, the steering input,
//! the built-in autopilot and the debug display through these traits.
//! Every collaborator is moved onto a scheduler thread when the
//! scheduler starts (the sink onto its own) and handed back for
//! teardown when it stops, so each must be [`Send`].
//!
//! Each trait has a `release` hook with a no-op default. Teardown calls
//! it exactly once.

use lanekeep_pipeline::{Frame, RgbImage, SteerCommand};

use crate::error::CollaboratorError;
use crate::tick::TickStats;

/// Source of video frames, one per tick.
pub trait FrameSource: Send {
    /// Capture the current frame.
    ///
    /// # Errors
    ///
    /// A failure is transient: the tick is recorded as a failure and the
    /// loop carries on.
    fn capture_frame(&mut self) -> Result<Frame, CollaboratorError>;

    /// Release the underlying driver.
    ///
    /// # Errors
    ///
    /// Reported and logged by teardown.
    fn release(&mut self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Steering input, e.g. simulated key presses.
pub trait Actuator: Send {
    /// Press the steering input for `command.hold`, then release it and
    /// wait `command.release`. Only called for commands that actuate.
    ///
    /// # Errors
    ///
    /// Best-effort: errors are logged, never propagated.
    fn actuate(&mut self, command: &SteerCommand) -> Result<(), CollaboratorError>;

    /// Release any held inputs.
    ///
    /// # Errors
    ///
    /// Reported and logged by teardown.
    fn release(&mut self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// The simulator's built-in straightening behavior.
///
/// Engaging and disengaging are idempotent.
pub trait RecoveryBehavior: Send {
    /// Hand steering to the built-in behavior.
    ///
    /// # Errors
    ///
    /// Logged by the scheduler.
    fn engage(&mut self) -> Result<(), CollaboratorError>;

    /// Take steering back from the built-in behavior.
    ///
    /// # Errors
    ///
    /// Logged by the scheduler.
    fn disengage(&mut self) -> Result<(), CollaboratorError>;

    /// Whether the built-in behavior currently steers.
    fn is_active(&self) -> bool;

    /// Leave the behavior disengaged.
    ///
    /// # Errors
    ///
    /// Reported and logged by teardown.
    fn release(&mut self) -> Result<(), CollaboratorError> {
        if self.is_active() {
            self.disengage()
        } else {
            Ok(())
        }
    }
}

/// Debug display for the overlay and per-tick stats.
///
/// The scheduler calls it from a dedicated visualization thread, so a
/// slow `publish` delays the display, never the control loop. Failures
/// are swallowed.
pub trait VisualizationSink: Send {
    /// Show one tick's overlay (when rendered) and stats.
    ///
    /// # Errors
    ///
    /// Logged and ignored.
    fn publish(
        &mut self,
        overlay: Option<&RgbImage>,
        stats: &TickStats,
    ) -> Result<(), CollaboratorError>;

    /// Close the display.
    ///
    /// # Errors
    ///
    /// Reported and logged by teardown.
    fn release(&mut self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl VisualizationSink for NullSink {
    fn publish(&mut self, _: Option<&RgbImage>, _: &TickStats) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// The full set of collaborators a scheduler drives.
pub struct Collaborators {
    /// Frame source.
    pub frames: Box<dyn FrameSource>,
    /// Steering input.
    pub actuator: Box<dyn Actuator>,
    /// Built-in straightening behavior.
    pub recovery: Box<dyn RecoveryBehavior>,
    /// Debug display.
    pub sink: Box<dyn VisualizationSink>,
}

impl Collaborators {
    /// Bundle collaborators, with a [`NullSink`] for visualization.
    pub fn new(
        frames: impl FrameSource + 'static,
        actuator: impl Actuator + 'static,
        recovery: impl RecoveryBehavior + 'static,
    ) -> Self {
        Self {
            frames: Box::new(frames),
            actuator: Box::new(actuator),
            recovery: Box::new(recovery),
            sink: Box::new(NullSink),
        }
    }

    /// Replace the visualization sink.
    #[must_use]
    pub fn with_sink(mut self, sink: impl VisualizationSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Separate what the tick thread drives from the display.
    pub(crate) fn split(self) -> (Drivers, Box<dyn VisualizationSink>) {
        let Self {
            frames,
            actuator,
            recovery,
            sink,
        } = self;
        (
            Drivers {
                frames,
                actuator,
                recovery,
            },
            sink,
        )
    }
}

/// Collaborators owned by the tick thread.
pub(crate) struct Drivers {
    pub(crate) frames: Box<dyn FrameSource>,
    pub(crate) actuator: Box<dyn Actuator>,
    pub(crate) recovery: Box<dyn RecoveryBehavior>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
