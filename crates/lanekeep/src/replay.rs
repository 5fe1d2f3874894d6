//! Replay adapters: stand-ins for the simulator built from captured frames.
//!
//! Frames come from a directory of screenshots, steering pulses and
//! autopilot handoffs are logged rather than sent to a game window, and
//! the visualization sink writes overlays and per-tick stats to disk.

use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use lanekeep_pipeline::{Frame, RgbImage, SteerCommand, SteerDirection};
use lanekeep_runtime::{
    Actuator, CollaboratorError, ControlHandle, FrameSource, KeyBindings, RecoveryBehavior,
    TickStats, VisualizationSink,
};

const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Plays the image files of a directory in name order, looping at the end.
#[derive(Debug)]
pub struct DirFrameSource {
    paths: Vec<PathBuf>,
    next: usize,
}

impl DirFrameSource {
    /// Collect the frame files in `dir`.
    ///
    /// # Errors
    ///
    /// Fails if `dir` cannot be listed or holds no image files.
    pub fn open(dir: &Path) -> io::Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_frame {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no frames in {}", dir.display()),
            ));
        }
        paths.sort();
        tracing::info!(dir = %dir.display(), frames = paths.len(), "frame directory opened");
        Ok(Self { paths, next: 0 })
    }

    /// Number of frames in one pass.
    pub fn frame_count(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for DirFrameSource {
    fn capture_frame(&mut self) -> Result<Frame, CollaboratorError> {
        let path = &self.paths[self.next % self.paths.len()];
        self.next += 1;
        let frame = image::open(path)
            .map_err(|e| CollaboratorError::failed(format!("{}: {e}", path.display())))?;
        Ok(frame.to_rgb8())
    }
}

/// Logs steering pulses instead of pressing keys.
#[derive(Debug, Default)]
pub struct LoggingActuator {
    realtime: bool,
    left: Duration,
    right: Duration,
}

impl LoggingActuator {
    /// With `realtime`, each pulse blocks for its hold and release time
    /// as a key press would.
    pub fn new(realtime: bool) -> Self {
        Self {
            realtime,
            ..Self::default()
        }
    }
}

impl Actuator for LoggingActuator {
    fn actuate(&mut self, command: &SteerCommand) -> Result<(), CollaboratorError> {
        match command.direction {
            SteerDirection::Left => self.left += command.hold,
            SteerDirection::Right => self.right += command.hold,
            SteerDirection::None => return Ok(()),
        }
        tracing::info!(
            direction = %command.direction,
            hold_ms = command.hold.as_secs_f64() * 1000.0,
            "steer"
        );
        if self.realtime {
            thread::sleep(command.hold + command.release);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), CollaboratorError> {
        tracing::info!(
            left_secs = self.left.as_secs_f64(),
            right_secs = self.right.as_secs_f64(),
            "total steering"
        );
        Ok(())
    }
}

/// Stands in for the simulator's autopilot toggle.
#[derive(Debug, Default)]
pub struct SimulatedAutopilot {
    active: bool,
}

impl RecoveryBehavior for SimulatedAutopilot {
    fn engage(&mut self) -> Result<(), CollaboratorError> {
        if !self.active {
            tracing::info!("autopilot engaged");
            self.active = true;
        }
        Ok(())
    }

    fn disengage(&mut self) -> Result<(), CollaboratorError> {
        if self.active {
            tracing::info!("autopilot disengaged");
            self.active = false;
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Writes overlays as `tick-NNNNNN.png` and stats as JSON lines.
#[derive(Debug)]
pub struct OverlayDirSink {
    dir: PathBuf,
    stats: BufWriter<File>,
}

impl OverlayDirSink {
    /// Create `dir` if needed and open `dir/stats.jsonl`.
    ///
    /// # Errors
    ///
    /// Fails if the directory or stats file cannot be created.
    pub fn create(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let stats = BufWriter::new(File::create(dir.join("stats.jsonl"))?);
        Ok(Self {
            dir: dir.to_path_buf(),
            stats,
        })
    }
}

impl VisualizationSink for OverlayDirSink {
    fn publish(
        &mut self,
        overlay: Option<&RgbImage>,
        stats: &TickStats,
    ) -> Result<(), CollaboratorError> {
        if let Some(overlay) = overlay {
            let path = self.dir.join(format!("tick-{:06}.png", stats.tick));
            overlay
                .save(&path)
                .map_err(|e| CollaboratorError::failed(format!("{}: {e}", path.display())))?;
        }
        serde_json::to_writer(&mut self.stats, stats)
            .map_err(|e| CollaboratorError::failed(e.to_string()))?;
        self.stats.write_all(b"\n")?;
        Ok(())
    }

    fn release(&mut self) -> Result<(), CollaboratorError> {
        self.stats.flush()?;
        Ok(())
    }
}

/// Read keys from stdin, one per line, on a background thread. An empty
/// line is `space`.
///
/// Returns a stop flag. A blocked stdin read cannot be interrupted, so
/// the thread notices the flag at the next line or dies with the
/// process.
///
/// # Errors
///
/// Fails if the thread cannot be spawned.
pub fn spawn_key_listener(bindings: KeyBindings) -> io::Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let keys = bindings.keys().collect::<Vec<_>>().join(", ");
    tracing::info!(%keys, "key listener reading stdin (empty line = space)");

    thread::Builder::new()
        .name("lanekeep-keys".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if flag.load(Ordering::Acquire) {
                    break;
                }
                let Ok(line) = line else { break };
                let key = match line.trim() {
                    "" => "space",
                    key => key,
                };
                if !bindings.dispatch(key) {
                    tracing::info!(key, "unbound key");
                }
            }
        })?;
    Ok(stop)
}

/// Request shutdown once `interrupt` fires. Returns `false` if listening
/// for it failed.
async fn shutdown_on(
    interrupt: impl Future<Output = io::Result<()>>,
    handle: &ControlHandle,
) -> bool {
    match interrupt.await {
        Ok(()) => {
            tracing::info!("interrupt received, shutting down");
            handle.shutdown();
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            false
        }
    }
}

/// Turn Ctrl-C into an orderly shutdown through `handle`.
///
/// A second Ctrl-C exits at once without waiting for teardown.
///
/// # Errors
///
/// Fails if the signal runtime or its thread cannot be created.
pub fn spawn_interrupt_handler(handle: ControlHandle) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("lanekeep-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if shutdown_on(tokio::signal::ctrl_c(), &handle).await
                    && tokio::signal::ctrl_c().await.is_ok()
                {
                    tracing::warn!("second interrupt, exiting without teardown");
                    std::process::exit(130);
                }
            });
        })?;
    Ok(())
}
