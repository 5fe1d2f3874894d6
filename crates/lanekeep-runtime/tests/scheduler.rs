//! Integration tests: drive a full scheduler with scripted collaborators.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lanekeep_pipeline::{Frame, RgbImage, SteerCommand, SteerDirection};
use lanekeep_runtime::{
    Actuator, CollaboratorError, Collaborators, FrameSource, RecoveryBehavior, ReleaseOutcome,
    RunState, RuntimeError, Scheduler, SessionConfig, TickStats, VisualizationSink,
};

const W: u32 = 640;
const H: u32 = 360;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Actuate(SteerDirection),
    Engage,
    Disengage,
    Published {
        tick: u64,
        success: bool,
        anchor: u32,
        offset: Option<i32>,
        recovery: bool,
        overlay: bool,
    },
    Released(&'static str),
}

type Log = Arc<Mutex<Vec<Event>>>;

fn push(log: &Log, event: Event) {
    log.lock().unwrap().push(event);
}

fn events(log: &Log) -> Vec<Event> {
    log.lock().unwrap().clone()
}

fn published(log: &Log) -> Vec<Event> {
    events(log)
        .into_iter()
        .filter(|e| matches!(e, Event::Published { .. }))
        .collect()
}

fn released(log: &Log) -> Vec<&'static str> {
    events(log)
        .into_iter()
        .filter_map(|e| match e {
            Event::Released(name) => Some(name),
            _ => None,
        })
        .collect()
}

/// Dark asphalt with one bright line starting at column `left`.
fn road_frame(left: u32) -> Frame {
    RgbImage::from_fn(W, H, |x, _| {
        if (left..left + 8).contains(&x) {
            image::Rgb([240, 240, 235])
        } else {
            image::Rgb([55, 58, 60])
        }
    })
}

fn blank_frame() -> Frame {
    RgbImage::from_pixel(W, H, image::Rgb([55, 58, 60]))
}

#[derive(Debug, Clone, Copy)]
enum Shot {
    Line(u32),
    Blank,
    Error,
    Panic,
}

/// Plays a script of frames, repeating the last entry forever.
struct ScriptedFrames {
    script: Vec<Shot>,
    next: usize,
    log: Log,
}

impl FrameSource for ScriptedFrames {
    fn capture_frame(&mut self) -> Result<Frame, CollaboratorError> {
        let shot = self.script[self.next.min(self.script.len() - 1)];
        self.next += 1;
        match shot {
            Shot::Line(left) => Ok(road_frame(left)),
            Shot::Blank => Ok(blank_frame()),
            Shot::Error => Err(CollaboratorError::failed("window not found")),
            Shot::Panic => panic!("capture driver crashed"),
        }
    }

    fn release(&mut self) -> Result<(), CollaboratorError> {
        push(&self.log, Event::Released("frames"));
        Ok(())
    }
}

struct RecordingActuator {
    fail: bool,
    crash: bool,
    log: Log,
}

impl Actuator for RecordingActuator {
    fn actuate(&mut self, command: &SteerCommand) -> Result<(), CollaboratorError> {
        push(&self.log, Event::Actuate(command.direction));
        if self.crash {
            panic!("input driver crashed");
        }
        if self.fail {
            return Err(CollaboratorError::failed("key injection refused"));
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), CollaboratorError> {
        push(&self.log, Event::Released("actuator"));
        Ok(())
    }
}

struct RecordingRecovery {
    active: bool,
    log: Log,
}

impl RecoveryBehavior for RecordingRecovery {
    fn engage(&mut self) -> Result<(), CollaboratorError> {
        self.active = true;
        push(&self.log, Event::Engage);
        Ok(())
    }

    fn disengage(&mut self) -> Result<(), CollaboratorError> {
        self.active = false;
        push(&self.log, Event::Disengage);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn release(&mut self) -> Result<(), CollaboratorError> {
        push(&self.log, Event::Released("recovery"));
        Ok(())
    }
}

struct RecordingSink {
    fail: bool,
    delay: Duration,
    log: Log,
}

impl VisualizationSink for RecordingSink {
    fn publish(
        &mut self,
        overlay: Option<&RgbImage>,
        stats: &TickStats,
    ) -> Result<(), CollaboratorError> {
        thread::sleep(self.delay);
        push(
            &self.log,
            Event::Published {
                tick: stats.tick,
                success: stats.success,
                anchor: stats.anchor,
                offset: stats.offset,
                recovery: stats.recovery,
                overlay: overlay.is_some(),
            },
        );
        if self.fail {
            return Err(CollaboratorError::failed("display closed"));
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), CollaboratorError> {
        push(&self.log, Event::Released("sink"));
        Ok(())
    }
}

struct Harness {
    script: Vec<Shot>,
    recovery_active: bool,
    actuator_fails: bool,
    actuator_crashes: bool,
    sink_fails: bool,
    sink_delay: Duration,
}

impl Harness {
    fn new(script: Vec<Shot>) -> Self {
        Self {
            script,
            recovery_active: false,
            actuator_fails: false,
            actuator_crashes: false,
            sink_fails: false,
            sink_delay: Duration::ZERO,
        }
    }

    fn build(self, log: &Log) -> Collaborators {
        Collaborators::new(
            ScriptedFrames {
                script: self.script,
                next: 0,
                log: Arc::clone(log),
            },
            RecordingActuator {
                fail: self.actuator_fails,
                crash: self.actuator_crashes,
                log: Arc::clone(log),
            },
            RecordingRecovery {
                active: self.recovery_active,
                log: Arc::clone(log),
            },
        )
        .with_sink(RecordingSink {
            fail: self.sink_fails,
            delay: self.sink_delay,
            log: Arc::clone(log),
        })
    }
}

fn fast_config(max_ticks: Option<u64>) -> SessionConfig {
    let mut config = SessionConfig::default();
    config.scheduler.tick_period = Duration::from_millis(1);
    config.scheduler.recovery_duration = Duration::from_millis(5);
    config.scheduler.max_ticks = max_ticks;
    config
}

fn wait_for(what: &str, timeout: Duration, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

fn run_to_completion(config: SessionConfig, harness: Harness) -> (Log, lanekeep_runtime::SessionReport) {
    let log = Log::default();
    let mut scheduler = Scheduler::new(config, harness.build(&log)).unwrap();
    scheduler.start().unwrap();
    let report = scheduler.join().unwrap();
    assert_eq!(scheduler.state(), RunState::Exiting);
    (log, report)
}

#[test]
fn follows_a_left_line_with_left_pulses() {
    let (log, report) = run_to_completion(fast_config(Some(3)), Harness::new(vec![Shot::Line(100)]));

    assert_eq!(report.ticks, 3);
    assert_eq!(report.successes, 3);
    assert_eq!(report.recoveries, 0);
    assert_eq!(report.state.previous_center, 260);

    let actuations: Vec<_> = events(&log)
        .into_iter()
        .filter(|e| matches!(e, Event::Actuate(_)))
        .collect();
    assert_eq!(actuations, vec![Event::Actuate(SteerDirection::Left); 3]);

    let anchors: Vec<_> = published(&log)
        .into_iter()
        .map(|e| match e {
            Event::Published {
                anchor,
                offset,
                success,
                overlay,
                ..
            } => {
                assert!(success);
                assert_eq!(offset, Some(-60));
                assert!(!overlay);
                anchor
            }
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(anchors, vec![320, 260, 260]);
}

#[test]
fn centered_lane_issues_no_pulse() {
    let (log, report) = run_to_completion(fast_config(Some(2)), Harness::new(vec![Shot::Line(160)]));
    assert_eq!(report.successes, 2);
    assert!(!events(&log).iter().any(|e| matches!(e, Event::Actuate(_))));
}

#[test]
fn overlay_reaches_the_sink_when_enabled() {
    let mut config = fast_config(Some(1));
    config.pipeline.estimator.overlay = true;
    let (log, _) = run_to_completion(config, Harness::new(vec![Shot::Line(100)]));
    assert!(matches!(
        published(&log)[..],
        [Event::Published { overlay: true, .. }]
    ));
}

#[test]
fn three_failures_trigger_recovery_and_reset_the_anchor() {
    let script = vec![
        Shot::Line(100),
        Shot::Blank,
        Shot::Blank,
        Shot::Blank,
        Shot::Line(100),
    ];
    let (log, report) = run_to_completion(fast_config(Some(5)), Harness::new(script));

    assert_eq!(report.ticks, 5);
    assert_eq!(report.successes, 2);
    assert_eq!(report.recoveries, 1);

    let flow: Vec<_> = events(&log)
        .into_iter()
        .filter_map(|e| match e {
            Event::Published {
                tick,
                anchor,
                recovery,
                ..
            } => Some(format!("tick{tick}@{anchor}{}", if recovery { "!" } else { "" })),
            Event::Engage => Some("engage".to_string()),
            Event::Disengage => Some("disengage".to_string()),
            _ => None,
        })
        .collect();
    let ticks: Vec<_> = flow.iter().filter(|e| e.starts_with("tick")).collect();
    assert_eq!(
        ticks,
        vec!["tick1@320", "tick2@260", "tick3@260", "tick4@260!", "tick5@320"]
    );

    // Publishing runs on its own thread; tick 4 is queued only after the
    // maneuver has finished.
    let at = |name: &str| flow.iter().position(|e| e == name).unwrap();
    assert!(at("engage") < at("disengage"));
    assert!(at("disengage") < at("tick4@260!"));
}

#[test]
fn capture_errors_and_panics_count_as_failures() {
    let script = vec![Shot::Error, Shot::Panic, Shot::Blank, Shot::Line(100)];
    let (log, report) = run_to_completion(fast_config(Some(4)), Harness::new(script));

    assert_eq!(report.ticks, 4);
    assert_eq!(report.successes, 1);
    assert_eq!(report.recoveries, 1);
    let successes: Vec<_> = published(&log)
        .into_iter()
        .map(|e| matches!(e, Event::Published { success: true, .. }))
        .collect();
    assert_eq!(successes, vec![false, false, false, true]);
}

#[test]
fn collaborator_failures_do_not_stop_the_loop() {
    let mut harness = Harness::new(vec![Shot::Line(100)]);
    harness.actuator_fails = true;
    harness.sink_fails = true;
    let (log, report) = run_to_completion(fast_config(Some(3)), harness);

    assert_eq!(report.ticks, 3);
    assert_eq!(report.successes, 3);
    assert_eq!(published(&log).len(), 3);
}

#[test]
fn actuator_panic_fails_the_tick_and_keeps_the_anchor() {
    let mut harness = Harness::new(vec![Shot::Line(100)]);
    harness.actuator_crashes = true;
    let (log, report) = run_to_completion(fast_config(Some(2)), harness);

    assert_eq!(report.ticks, 2);
    assert_eq!(report.successes, 0);
    assert_eq!(report.state.previous_center, 320);
    let anchors: Vec<_> = published(&log)
        .into_iter()
        .map(|e| match e {
            Event::Published {
                anchor, success, ..
            } => (anchor, success),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(anchors, vec![(320, false), (320, false)]);
}

#[test]
fn slow_sink_does_not_hold_up_the_ticks() {
    let mut config = fast_config(Some(10));
    config.scheduler.visualization_queue = 2;
    let mut harness = Harness::new(vec![Shot::Line(100)]);
    harness.sink_delay = Duration::from_millis(300);

    let log = Log::default();
    let mut scheduler = Scheduler::new(config, harness.build(&log)).unwrap();
    let handle = scheduler.handle();
    let started = Instant::now();
    scheduler.start().unwrap();

    // Ten publishes would take three seconds if the ticks waited on them.
    wait_for("tick limit", Duration::from_secs(10), || {
        handle.state() == RunState::Exiting
    });
    assert!(started.elapsed() < Duration::from_secs(2));

    let report = scheduler.join().unwrap();
    assert_eq!(report.ticks, 10);
    assert!(report.dropped_publications > 0);
    assert_eq!(
        usize::try_from(report.ticks - report.dropped_publications).unwrap(),
        published(&log).len()
    );
    assert_eq!(released(&log).first(), Some(&"sink"));
}

#[test]
fn takes_control_from_an_active_autopilot_at_start() {
    let mut harness = Harness::new(vec![Shot::Line(100)]);
    harness.recovery_active = true;
    let (log, _) = run_to_completion(fast_config(Some(1)), harness);
    assert_eq!(events(&log).first(), Some(&Event::Disengage));
}

#[test]
fn teardown_runs_once_in_order() {
    let log = Log::default();
    let mut scheduler = Scheduler::new(
        fast_config(Some(2)),
        Harness::new(vec![Shot::Line(100)]).build(&log),
    )
    .unwrap();
    let listener_log = Arc::clone(&log);
    scheduler.register_resource("key listener", move || {
        push(&listener_log, Event::Released("listener"));
        Ok(())
    });
    scheduler.start().unwrap();

    let report = scheduler.join().unwrap();
    assert_eq!(
        released(&log),
        vec!["sink", "listener", "recovery", "actuator", "frames"]
    );
    assert_eq!(
        report.teardown.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        vec![
            "visualization sink",
            "key listener",
            "recovery behavior",
            "actuator",
            "frame source",
        ]
    );
    assert!(
        report
            .teardown
            .iter()
            .all(|r| r.outcome == ReleaseOutcome::Released)
    );

    let again = scheduler.shutdown().unwrap();
    assert_eq!(again.ticks, report.ticks);
    drop(scheduler);
    assert_eq!(released(&log).len(), 5);
}

#[test]
fn second_start_is_rejected() {
    let log = Log::default();
    let mut scheduler = Scheduler::new(
        fast_config(None),
        Harness::new(vec![Shot::Line(100)]).build(&log),
    )
    .unwrap();
    scheduler.start().unwrap();
    assert!(matches!(scheduler.start(), Err(RuntimeError::AlreadyStarted)));
    scheduler.shutdown().unwrap();
    assert!(matches!(scheduler.start(), Err(RuntimeError::AlreadyStarted)));
}

#[test]
fn never_started_scheduler_still_releases_on_drop() {
    let log = Log::default();
    let scheduler = Scheduler::new(
        fast_config(None),
        Harness::new(vec![Shot::Blank]).build(&log),
    )
    .unwrap();
    assert_eq!(scheduler.state(), RunState::Idle);
    drop(scheduler);
    assert_eq!(released(&log), vec!["sink", "recovery", "actuator", "frames"]);
    assert!(published(&log).is_empty());
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let mut config = fast_config(None);
    config.supervisor.window = 0;
    let log = Log::default();
    let result = Scheduler::new(config, Harness::new(vec![Shot::Blank]).build(&log));
    assert!(matches!(result, Err(RuntimeError::Config(_))));
}

#[test]
fn pause_stops_ticks_and_resume_wakes_immediately() {
    let mut config = fast_config(None);
    config.scheduler.tick_period = Duration::from_millis(2);
    config.scheduler.pause_poll = Duration::from_secs(60);

    let log = Log::default();
    let mut scheduler = Scheduler::new(
        config,
        Harness::new(vec![Shot::Line(100)]).build(&log),
    )
    .unwrap();
    let handle = scheduler.handle();
    scheduler.start().unwrap();
    assert_eq!(handle.state(), RunState::Running);

    wait_for("first ticks", Duration::from_secs(5), || published(&log).len() >= 2);
    handle.pause();
    assert_eq!(handle.state(), RunState::Paused);
    thread::sleep(Duration::from_millis(50));
    let paused_at = published(&log).len();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(published(&log).len(), paused_at);

    handle.resume();
    wait_for("ticks after resume", Duration::from_secs(5), || {
        published(&log).len() > paused_at
    });

    let report = scheduler.shutdown().unwrap();
    assert_eq!(scheduler.state(), RunState::Exiting);
    assert_eq!(usize::try_from(report.ticks).unwrap(), published(&log).len());
}

#[test]
fn shutdown_while_paused_exits_promptly_and_tears_down() {
    let mut config = fast_config(None);
    config.scheduler.pause_poll = Duration::from_secs(60);

    let log = Log::default();
    let mut scheduler = Scheduler::new(
        config,
        Harness::new(vec![Shot::Line(100)]).build(&log),
    )
    .unwrap();
    let listener_log = Arc::clone(&log);
    scheduler.register_resource("key listener", move || {
        push(&listener_log, Event::Released("listener"));
        Ok(())
    });
    let handle = scheduler.handle();
    scheduler.start().unwrap();
    wait_for("first tick", Duration::from_secs(5), || !published(&log).is_empty());

    handle.pause();
    assert_eq!(handle.state(), RunState::Paused);
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    let report = scheduler.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(scheduler.state(), RunState::Exiting);
    assert!(report.ticks >= 1);
    assert_eq!(
        released(&log),
        vec!["sink", "listener", "recovery", "actuator", "frames"]
    );
}

#[test]
fn shutdown_cuts_a_long_tick_period_short() {
    let mut config = fast_config(None);
    config.scheduler.tick_period = Duration::from_secs(60);

    let log = Log::default();
    let mut scheduler = Scheduler::new(
        config,
        Harness::new(vec![Shot::Line(100)]).build(&log),
    )
    .unwrap();
    scheduler.start().unwrap();
    wait_for("first tick", Duration::from_secs(5), || published(&log).len() == 1);

    let started = Instant::now();
    let report = scheduler.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.ticks, 1);
}

#[test]
fn shutdown_cuts_recovery_short_and_still_disengages() {
    let mut config = fast_config(None);
    config.scheduler.recovery_duration = Duration::from_secs(60);

    let log = Log::default();
    let mut scheduler = Scheduler::new(
        config,
        Harness::new(vec![Shot::Blank]).build(&log),
    )
    .unwrap();
    scheduler.start().unwrap();
    wait_for("recovery", Duration::from_secs(5), || {
        events(&log).contains(&Event::Engage)
    });

    let started = Instant::now();
    let report = scheduler.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.recoveries, 1);
    assert_eq!(report.ticks, 3);

    let trail: Vec<_> = events(&log)
        .into_iter()
        .filter(|e| matches!(e, Event::Engage | Event::Disengage))
        .collect();
    assert_eq!(trail, vec![Event::Engage, Event::Disengage]);
}
