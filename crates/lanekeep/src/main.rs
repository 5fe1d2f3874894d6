//! lanekeep: closed-loop lane-centering controller.
//!
//! `lanekeep replay` runs the control scheduler against a directory of
//! captured frames, logging each steering pulse and autopilot handoff.
//! Keys typed on stdin (one per line) pause, resume or stop the loop.
//! Ctrl-C stops it too, still releasing everything in order.
//!
//! `lanekeep scene` writes the simulator's persisted scene settings.
//!
//! # Usage
//!
//! ```text
//! lanekeep replay [OPTIONS] <FRAMES_DIR>
//! lanekeep scene --storage <FILE> [--topography T] [--season S] [--weather W]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod replay;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use lanekeep_runtime::{
    Collaborators, KeyBindings, ReleaseOutcome, RuntimeError, SceneConfig, Scheduler, Season,
    SessionConfig, SessionReport, Topography, Weather,
};
use tracing_subscriber::EnvFilter;

use crate::replay::{
    DirFrameSource, LoggingActuator, OverlayDirSink, SimulatedAutopilot, spawn_interrupt_handler,
    spawn_key_listener,
};

const DEFAULT_LOG_FILTER: &str = "lanekeep=info,lanekeep_runtime=info";

/// Closed-loop lane-centering controller.
#[derive(Parser)]
#[command(name = "lanekeep", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the controller with captured frames.
    Replay(ReplayArgs),
    /// Write scene settings into the simulator's storage file.
    Scene(SceneArgs),
}

#[derive(clap::Args)]
struct ReplayArgs {
    /// Directory of frames (PNG, JPEG, BMP, WebP), played in name order.
    frames_dir: PathBuf,

    /// Session configuration file (JSON).
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Session configuration as a JSON string.
    #[arg(long)]
    config_json: Option<String>,

    /// Tick period in milliseconds.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u64>::new().range(1..))]
    tick_ms: Option<u64>,

    /// Stop after this many ticks (defaults to one pass over the frames).
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Seconds the autopilot steers during a recovery.
    #[arg(long)]
    recovery_secs: Option<f64>,

    /// Write overlays and per-tick stats into this directory.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Block for each pulse's hold and release time.
    #[arg(long)]
    realtime: bool,

    /// Do not read keys from stdin.
    #[arg(long)]
    no_keys: bool,
}

#[derive(clap::Args)]
struct SceneArgs {
    /// Storage file to update; other keys in it are kept.
    #[arg(long)]
    storage: PathBuf,

    /// Road shape (straight, casual, easy, normal, hard).
    #[arg(long)]
    topography: Option<Topography>,

    /// Landscape skin (default, autumn, spring, winter).
    #[arg(long)]
    season: Option<Season>,

    /// Time of day by name or index (sunrise=0 .. night=4).
    #[arg(long)]
    weather: Option<Weather>,
}

fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Replay(args) => replay(&args),
        Command::Scene(args) => scene(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

/// Build the session configuration from a file or JSON string plus the
/// per-parameter overrides.
fn session_config(args: &ReplayArgs, frame_count: usize) -> Result<SessionConfig, String> {
    let mut config = if let Some(ref path) = args.config {
        SessionConfig::load(path).map_err(|e| format!("Error loading {}: {e}", path.display()))?
    } else if let Some(ref json) = args.config_json {
        SessionConfig::from_json(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        SessionConfig::default()
    };

    if let Some(ms) = args.tick_ms {
        config.scheduler.tick_period = Duration::from_millis(ms);
    }
    if let Some(secs) = args.recovery_secs {
        config.scheduler.recovery_duration = Duration::try_from_secs_f64(secs)
            .map_err(|e| format!("Invalid --recovery-secs {secs}: {e}"))?;
    }
    config.scheduler.max_ticks = args
        .max_ticks
        .or(config.scheduler.max_ticks)
        .or_else(|| u64::try_from(frame_count).ok());
    config.pipeline.estimator.overlay |= args.overlay_dir.is_some();
    Ok(config)
}

fn replay(args: &ReplayArgs) -> Result<(), String> {
    let frames = DirFrameSource::open(&args.frames_dir)
        .map_err(|e| format!("Error opening {}: {e}", args.frames_dir.display()))?;
    let config = session_config(args, frames.frame_count())?;

    let mut collaborators = Collaborators::new(
        frames,
        LoggingActuator::new(args.realtime),
        SimulatedAutopilot::default(),
    );
    if let Some(ref dir) = args.overlay_dir {
        let sink = OverlayDirSink::create(dir)
            .map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
        collaborators = collaborators.with_sink(sink);
    }

    let mut scheduler = Scheduler::new(config, collaborators).map_err(|e| e.to_string())?;
    spawn_interrupt_handler(scheduler.handle())
        .map_err(|e| format!("Error installing Ctrl-C handler: {e}"))?;
    if !args.no_keys {
        let bindings = KeyBindings::with_defaults(scheduler.handle());
        let stop = spawn_key_listener(bindings)
            .map_err(|e| format!("Error starting key listener: {e}"))?;
        scheduler.register_resource("key listener", move || {
            stop.store(true, std::sync::atomic::Ordering::Release);
            Ok(())
        });
    }

    scheduler.start().map_err(|e| e.to_string())?;
    let report = scheduler.join().map_err(|e| e.to_string())?;
    print_report(&report);
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn print_report(report: &SessionReport) {
    let rate = if report.ticks == 0 {
        0.0
    } else {
        report.successes as f64 / report.ticks as f64 * 100.0
    };
    println!("Session Report\n{}", "=".repeat(60));
    println!("Ticks:       {}", report.ticks);
    println!("Lane found:  {} ({rate:.1}%)", report.successes);
    println!("Recoveries:  {}", report.recoveries);
    if report.dropped_publications > 0 {
        println!("Not shown:   {} ticks", report.dropped_publications);
    }
    println!("Last anchor: {}", report.state.previous_center);
    for record in &report.teardown {
        match &record.outcome {
            ReleaseOutcome::Released => {}
            ReleaseOutcome::Failed(msg) | ReleaseOutcome::Panicked(msg) => {
                println!("Release of {} failed: {msg}", record.name);
            }
        }
    }
}

fn load_or_default_scene(path: &Path) -> Result<SceneConfig, RuntimeError> {
    match SceneConfig::load(path) {
        Err(RuntimeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(SceneConfig::default())
        }
        other => other,
    }
}

fn scene(args: &SceneArgs) -> Result<(), String> {
    let mut scene = load_or_default_scene(&args.storage)
        .map_err(|e| format!("Error reading {}: {e}", args.storage.display()))?;
    if let Some(topography) = args.topography {
        scene.topography = topography;
    }
    if let Some(season) = args.season {
        scene.season = season;
    }
    if let Some(weather) = args.weather {
        scene.weather = weather;
    }
    scene
        .save(&args.storage)
        .map_err(|e| format!("Error writing {}: {e}", args.storage.display()))?;
    println!("{scene}");
    Ok(())
}
