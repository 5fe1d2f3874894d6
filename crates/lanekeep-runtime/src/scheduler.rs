//! Control scheduler: the dedicated tick thread and its lifecycle.
//!
//! ```text
//! Idle --start--> Running <--pause/resume--> Paused
//!   \                 \                        /
//!    +--------------- shutdown ---------------+--> Exiting
//! ```
//!
//! While running, each tick runs capture -> pipeline -> steering ->
//! failure window -> recovery (when due) -> publish, then sleeps out the
//! rest of the tick period. Publishing only queues the tick for the
//! visualization thread, which owns the sink. While paused the thread blocks on the
//! control channel for at most `pause_poll` at a time. Shutdown is
//! cooperative: a tick in progress finishes, every sleep is cut short.
//!
//! Collaborators move onto the tick and visualization threads at start
//! and come back when they are joined. Teardown then releases, exactly
//! once and in this order: visualization sink (after its queue drains),
//! registered resources, recovery behavior, actuator, frame source.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lanekeep_pipeline::diagnostics::duration_serde;
use lanekeep_pipeline::PipelineError;
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::collaborators::{Collaborators, Drivers, VisualizationSink};
use crate::config::SessionConfig;
use crate::control::{self, ControlHandle, Pacer, RunState};
use crate::error::{CollaboratorError, RuntimeError};
use crate::state::ControllerState;
use crate::teardown::{ReleaseFn, Teardown, TeardownRecord};
use crate::tick::{self, panic_message};
use crate::visualization::{self, Publisher, VisualizationThread};

/// Tick cadence and recovery timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Time from the start of one tick to the start of the next.
    #[serde(with = "duration_serde")]
    pub tick_period: Duration,
    /// Longest a paused thread waits before re-checking its flags.
    #[serde(with = "duration_serde")]
    pub pause_poll: Duration,
    /// How long the recovery behavior steers before control returns.
    #[serde(with = "duration_serde")]
    pub recovery_duration: Duration,
    /// Stop after this many ticks (unbounded when `None`).
    pub max_ticks: Option<u64>,
    /// Ticks that may wait for the visualization sink before new ones
    /// are dropped.
    pub visualization_queue: usize,
}

impl SchedulerConfig {
    /// Default tick period.
    pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(100);
    /// Default pause poll interval.
    pub const DEFAULT_PAUSE_POLL: Duration = Duration::from_secs(1);
    /// Default recovery duration.
    pub const DEFAULT_RECOVERY_DURATION: Duration = Duration::from_secs(3);
    /// Default visualization queue length.
    pub const DEFAULT_VISUALIZATION_QUEUE: usize = 8;

    /// Check that the periodic waits and the visualization queue are
    /// non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a zero tick period,
    /// pause poll or queue length.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.tick_period.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "tick period must be positive".to_string(),
            ));
        }
        if self.pause_poll.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "pause poll interval must be positive".to_string(),
            ));
        }
        if self.visualization_queue == 0 {
            return Err(PipelineError::InvalidConfig(
                "visualization queue must hold at least one tick".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_period: Self::DEFAULT_TICK_PERIOD,
            pause_poll: Self::DEFAULT_PAUSE_POLL,
            recovery_duration: Self::DEFAULT_RECOVERY_DURATION,
            max_ticks: None,
            visualization_queue: Self::DEFAULT_VISUALIZATION_QUEUE,
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Controller state as the tick thread left it.
    pub state: ControllerState,
    /// Ticks executed.
    pub ticks: u64,
    /// Ticks that found a lane line.
    pub successes: u64,
    /// Recovery maneuvers triggered.
    pub recoveries: u64,
    /// Ticks not shown because the visualization queue was full.
    pub dropped_publications: u64,
    /// Teardown steps, in the order they ran.
    pub teardown: Vec<TeardownRecord>,
}

/// Owns the tick thread and everything it drives.
pub struct Scheduler {
    config: SessionConfig,
    handle: ControlHandle,
    pacer: Option<Pacer>,
    collaborators: Option<Collaborators>,
    resources: Vec<(String, ReleaseFn)>,
    thread: Option<JoinHandle<TickLoop>>,
    visualization: Option<VisualizationThread>,
    report: Option<SessionReport>,
}

impl Scheduler {
    /// Create an idle scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] if `config` fails validation.
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Result<Self, RuntimeError> {
        config.validate()?;
        let (handle, pacer) = control::channel();
        Ok(Self {
            config,
            handle,
            pacer: Some(pacer),
            collaborators: Some(collaborators),
            resources: Vec::new(),
            thread: None,
            visualization: None,
            report: None,
        })
    }

    /// A handle for pausing, resuming or stopping from another thread.
    #[must_use]
    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.handle.state()
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register an extra resource (e.g. an input listener) to release
    /// during teardown, after the visualization sink and before the
    /// recovery behavior.
    pub fn register_resource(
        &mut self,
        name: impl Into<String>,
        release: impl FnOnce() -> Result<(), CollaboratorError> + Send + 'static,
    ) {
        self.resources.push((name.into(), Box::new(release)));
    }

    /// Spawn the visualization and tick threads.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::AlreadyStarted`] on a second call and
    /// [`RuntimeError::Spawn`] if a thread cannot be created.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.report.is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }
        let (Some(pacer), Some(collaborators)) = (self.pacer.take(), self.collaborators.take())
        else {
            return Err(RuntimeError::AlreadyStarted);
        };

        let (drivers, sink) = collaborators.split();
        let (publisher, visualization) =
            match visualization::spawn(sink, self.config.scheduler.visualization_queue) {
                Ok(spawned) => spawned,
                Err(e) => {
                    self.handle.shutdown();
                    return Err(RuntimeError::Spawn(e));
                }
            };
        self.visualization = Some(visualization);

        let tick_loop = TickLoop {
            state: ControllerState::new(&self.config),
            config: self.config.clone(),
            pacer,
            drivers,
            publisher,
        };

        self.handle.mark_started();
        let spawned = thread::Builder::new()
            .name("lanekeep-tick".to_string())
            .spawn(move || tick_loop.run());
        match spawned {
            Ok(thread) => {
                self.thread = Some(thread);
                Ok(())
            }
            Err(e) => {
                self.handle.shutdown();
                Err(RuntimeError::Spawn(e))
            }
        }
    }

    /// Wait for the tick thread to exit, then tear down.
    ///
    /// Blocks until shutdown is requested or `max_ticks` is reached.
    /// Joining a scheduler that never started just tears down. Calling
    /// `join` again returns the same report without releasing anything
    /// twice.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::TickThreadPanicked`] if the tick thread
    /// died outside a tick. Registered resources are still released.
    pub fn join(&mut self) -> Result<SessionReport, RuntimeError> {
        if let Some(report) = &self.report {
            return Ok(report.clone());
        }

        let mut panicked = false;
        let mut dropped_publications = 0;
        let mut sink = None;
        let (state, drivers) = match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(TickLoop {
                    state,
                    drivers,
                    publisher,
                    ..
                }) => {
                    dropped_publications = publisher.dropped();
                    (state, Some(drivers))
                }
                Err(payload) => {
                    tracing::error!(panic = panic_message(payload.as_ref()), "tick thread panicked");
                    panicked = true;
                    (ControllerState::new(&self.config), None)
                }
            },
            None => match self.collaborators.take().map(Collaborators::split) {
                Some((drivers, idle_sink)) => {
                    sink = Some(idle_sink);
                    (ControllerState::new(&self.config), Some(drivers))
                }
                None => (ControllerState::new(&self.config), None),
            },
        };
        self.handle.mark_finished();

        let teardown = self.teardown_plan(sink, drivers).run();
        tracing::info!(
            ticks = state.ticks,
            successes = state.successes,
            recoveries = state.recoveries,
            "session finished"
        );

        let report = SessionReport {
            ticks: state.ticks,
            successes: state.successes,
            recoveries: state.recoveries,
            dropped_publications,
            state,
            teardown,
        };
        self.report = Some(report.clone());

        if panicked {
            return Err(RuntimeError::TickThreadPanicked);
        }
        Ok(report)
    }

    /// Request exit and join. Idempotent.
    ///
    /// # Errors
    ///
    /// As [`join`](Self::join).
    pub fn shutdown(&mut self) -> Result<SessionReport, RuntimeError> {
        self.handle.shutdown();
        self.join()
    }

    /// `sink` is set only for a scheduler that never started; otherwise
    /// the sink comes back from the visualization thread.
    fn teardown_plan(
        &mut self,
        sink: Option<Box<dyn VisualizationSink>>,
        drivers: Option<Drivers>,
    ) -> Teardown {
        let mut teardown = Teardown::new();

        if let Some(visualization) = self.visualization.take() {
            teardown.push("visualization sink", move || visualization.finish()?.release());
        } else if let Some(mut sink) = sink {
            teardown.push("visualization sink", move || sink.release());
        }
        for (name, release) in self.resources.drain(..) {
            teardown.push_boxed(name, release);
        }
        if let Some(Drivers {
            mut frames,
            mut actuator,
            mut recovery,
        }) = drivers
        {
            teardown.push("recovery behavior", move || recovery.release());
            teardown.push("actuator", move || actuator.release());
            teardown.push("frame source", move || frames.release());
        }
        teardown
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.report.is_none() {
            let _ = self.shutdown();
        }
    }
}

/// Everything the tick thread owns.
struct TickLoop {
    config: SessionConfig,
    pacer: Pacer,
    drivers: Drivers,
    publisher: Publisher,
    state: ControllerState,
}

impl TickLoop {
    fn run(mut self) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let tick_period_ms = self.config.scheduler.tick_period.as_millis() as u64;
        tracing::info!(tick_period_ms, "tick thread started");
        self.take_control();

        loop {
            match self.pacer.state() {
                RunState::Exiting => break,
                RunState::Paused => {
                    self.pacer.wait_while_paused(self.config.scheduler.pause_poll);
                    continue;
                }
                RunState::Idle | RunState::Running => {}
            }

            let started = Instant::now();
            self.tick();

            if let Some(max) = self.config.scheduler.max_ticks
                && self.state.ticks >= max
            {
                tracing::info!(ticks = self.state.ticks, "tick limit reached");
                self.pacer.finish();
                break;
            }
            if !self
                .pacer
                .sleep_until(started + self.config.scheduler.tick_period)
            {
                break;
            }
        }

        tracing::info!(ticks = self.state.ticks, "tick thread exiting");
        self
    }

    /// Make sure the controller, not the built-in behavior, steers.
    fn take_control(&mut self) {
        if self.drivers.recovery.is_active() {
            tracing::info!("disengaging autonomous mode");
            if let Err(e) = self.drivers.recovery.disengage() {
                tracing::warn!(error = %e, "failed to disengage autonomous mode");
            }
        }
    }

    fn tick(&mut self) {
        let (evaluation, recovery_due) =
            tick::run_tick(&mut self.state, &mut self.drivers, &self.config.pipeline);
        if recovery_due {
            contain("recovery", || self.recover());
        }
        let (stats, overlay) = evaluation.into_stats(self.state.ticks, recovery_due);
        self.publisher.publish(stats, overlay);
    }

    fn recover(&mut self) {
        tracing::warn!(
            window = self.config.supervisor.window,
            "lane lost, engaging recovery"
        );
        match self.drivers.recovery.engage() {
            Ok(()) => {
                let deadline = Instant::now() + self.config.scheduler.recovery_duration;
                if !self.pacer.sleep_until(deadline) {
                    tracing::debug!("recovery cut short by shutdown");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to engage recovery"),
        }
        if let Err(e) = self.drivers.recovery.disengage() {
            tracing::warn!(error = %e, "failed to disengage recovery");
        }
        self.state.recovered();
    }
}

/// Run `f`, logging instead of propagating a panic.
fn contain(what: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(step = what, panic = panic_message(payload.as_ref()), "step panicked");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_period, Duration::from_millis(100));
        assert_eq!(config.pause_poll, Duration::from_secs(1));
        assert_eq!(config.recovery_duration, Duration::from_secs(3));
        assert_eq!(config.max_ticks, None);
        assert_eq!(config.visualization_queue, 8);
        config.validate().unwrap();
    }

    #[test]
    fn zero_waits_are_invalid() {
        let config = SchedulerConfig {
            tick_period: Duration::ZERO,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
        let config = SchedulerConfig {
            pause_poll: Duration::ZERO,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
        let config = SchedulerConfig {
            visualization_queue: 0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
