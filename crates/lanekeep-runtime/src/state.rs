//! Long-lived controller state, owned by the tick thread.

use lanekeep_pipeline::{Dimensions, FailureSupervisor};

use crate::config::SessionConfig;

/// State carried from one tick to the next for a whole session.
///
/// Only the tick thread mutates it. The scheduler hands it back in the
/// [`SessionReport`](crate::SessionReport) once the thread has joined.
#[derive(Debug, Clone)]
pub struct ControllerState {
    /// Search anchor: the last known lane-center column.
    pub previous_center: u32,
    /// Rolling window of recent tick outcomes.
    pub supervisor: FailureSupervisor,
    /// Ticks executed.
    pub ticks: u64,
    /// Ticks that found a lane line.
    pub successes: u64,
    /// Recovery maneuvers triggered.
    pub recoveries: u64,
    size: Dimensions,
}

impl ControllerState {
    /// Fresh state for a session: anchor at the image half-width and a
    /// failure window primed with successes.
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        let size = config.pipeline.mask.size;
        Self {
            previous_center: size.half_width(),
            supervisor: FailureSupervisor::new(config.supervisor),
            ticks: 0,
            successes: 0,
            recoveries: 0,
            size,
        }
    }

    /// Forget where the lane was, e.g. after the recovery maneuver moved
    /// the vehicle.
    pub fn reset_anchor(&mut self) {
        self.previous_center = self.size.half_width();
    }

    /// Record a tick outcome and report whether recovery is due.
    pub(crate) fn record(&mut self, success: bool) -> bool {
        self.ticks += 1;
        if success {
            self.successes += 1;
        }
        self.supervisor.record(success)
    }

    /// Bookkeeping after a recovery maneuver.
    pub(crate) fn recovered(&mut self) {
        self.recoveries += 1;
        self.supervisor.reset();
        self.reset_anchor();
    }
}
