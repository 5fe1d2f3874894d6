//! lanekeep-runtime: the control loop around the per-frame pipeline.
//!
//! A [`Scheduler`] owns a dedicated tick thread. Each tick captures a
//! frame from a [`FrameSource`], runs [`lanekeep_pipeline::process_frame`],
//! sends the steering pulse to an [`Actuator`], records the outcome in
//! the failure window and, when the window fills with failures, hands
//! steering to a [`RecoveryBehavior`] for a while. A
//! [`VisualizationSink`] receives the overlay and per-tick stats on its
//! own thread.
//!
//! Other threads pause, resume and stop the loop through a
//! [`ControlHandle`]; [`KeyBindings`] maps key presses onto it.
//! [`SceneConfig`] persists the simulator scene before a session.

pub mod collaborators;
pub mod config;
pub mod control;
pub mod error;
pub mod keys;
pub mod scene;
pub mod scheduler;
pub mod state;
pub mod teardown;
pub mod tick;
mod visualization;

pub use collaborators::{
    Actuator, Collaborators, FrameSource, NullSink, RecoveryBehavior, VisualizationSink,
};
pub use config::SessionConfig;
pub use control::{ControlHandle, RunState};
pub use error::{CollaboratorError, RuntimeError};
pub use keys::{KeyAction, KeyBindings};
pub use scene::{SceneConfig, SceneError, Season, Topography, Weather};
pub use scheduler::{Scheduler, SchedulerConfig, SessionReport};
pub use state::ControllerState;
pub use teardown::{ReleaseOutcome, Teardown, TeardownRecord};
pub use tick::{TickStats, WallClock};
