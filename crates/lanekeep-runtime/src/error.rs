//! Error types for the runtime crate.

use lanekeep_pipeline::PipelineError;

use crate::scene::SceneError;

/// Errors surfaced by the scheduler and session configuration.
///
/// Expected per-tick failures (no frame, no lane line, actuator faults)
/// never appear here; they are logged and folded into the failure
/// window instead.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// [`Scheduler::start`](crate::Scheduler::start) was called twice.
    #[error("scheduler already started")]
    AlreadyStarted,

    /// The tick thread could not be spawned.
    #[error("failed to spawn tick thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The tick thread panicked outside a tick and its collaborators
    /// were lost.
    #[error("tick thread panicked")]
    TickThreadPanicked,

    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] PipelineError),

    /// A persisted scene holds a value the simulator does not know.
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Reading or writing a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file is not valid JSON for its type.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by an external collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// The collaborator could not complete the request.
    #[error("{0}")]
    Failed(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollaboratorError {
    /// Convenience constructor for [`CollaboratorError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
