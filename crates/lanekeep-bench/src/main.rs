//! lanekeep-bench: CLI tool for tuning lane estimation on captured frames.
//!
//! Runs the per-frame pipeline on a saved screenshot with configurable
//! parameters, printing per-stage timings and the resulting steering
//! pulse. Useful for:
//!
//! - Comparing mask strategies (HSV band vs. grayscale threshold)
//! - Tuning the search band, pixel floor and lane width
//! - Checking which pulse a given gain and dead-band produce
//! - Measuring per-stage durations against the tick period
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin lanekeep-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use lanekeep_pipeline::diagnostics::process_frame_with_diagnostics;
use lanekeep_pipeline::{
    Connectivity, EstimatorConfig, HsvBand, MaskConfig, MaskStrategy, PipelineConfig,
    ResizeFilter, SteeringConfig,
};
use lanekeep_runtime::{SchedulerConfig, WallClock};

/// Lane estimation experimentation and diagnostics for lanekeep.
///
/// Runs the pipeline on one frame and prints per-stage timings, the
/// lane estimate and the steering pulse it maps to.
#[derive(Parser)]
#[command(name = "lanekeep-bench", version)]
struct Cli {
    /// Path to the input frame (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Mask strategy.
    #[arg(long, value_enum, default_value_t = Strategy::Hsv)]
    strategy: Strategy,

    /// Luminance threshold for the grayscale strategy (exclusive).
    #[arg(long, default_value_t = MaskStrategy::DEFAULT_GRAY_THRESHOLD)]
    gray_threshold: u8,

    /// Components with this many pixels or fewer are removed.
    #[arg(long, default_value_t = MaskConfig::DEFAULT_MIN_COMPONENT_SIZE)]
    min_component_size: u32,

    /// Use 4-connectivity in the noise filter instead of 8.
    #[arg(long)]
    four_connected: bool,

    /// Resize filter (nearest, triangle, catmull-rom, lanczos3).
    #[arg(long, value_enum, default_value_t = Filter::Triangle)]
    resize_filter: Filter,

    /// First row of the search band.
    #[arg(long, default_value_t = EstimatorConfig::DEFAULT_Y_MIN)]
    y_min: u32,

    /// Row just past the search band.
    #[arg(long, default_value_t = EstimatorConfig::DEFAULT_Y_MAX)]
    y_max: u32,

    /// Foreground pixels required to accept a lane line.
    #[arg(long, default_value_t = EstimatorConfig::DEFAULT_MIN_PIXELS)]
    min_pixels: u64,

    /// Lane width in pixels at the search band.
    #[arg(long, default_value_t = EstimatorConfig::DEFAULT_LANE_WIDTH)]
    lane_width: u32,

    /// Steering dead-band in pixels.
    #[arg(long, default_value_t = SteeringConfig::DEFAULT_DEADBAND)]
    deadband: u32,

    /// Proportional gain (seconds of hold per pixel).
    #[arg(long, default_value_t = SteeringConfig::DEFAULT_KP)]
    kp: f64,

    /// Maximum hold in milliseconds.
    #[arg(long, default_value_t = duration_ms(SteeringConfig::DEFAULT_MAX_HOLD))]
    max_hold_ms: u64,

    /// Search anchor column (defaults to the half-width).
    #[arg(long)]
    previous_center: Option<u32>,

    /// Write the debug overlay to this PNG.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Time the pipeline over this many runs; only the first is reported
    /// in full.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Tick period in milliseconds that the run times are checked against.
    #[arg(
        long,
        default_value_t = duration_ms(SchedulerConfig::DEFAULT_TICK_PERIOD),
        value_parser = clap::builder::RangedU64ValueParser::<u64>::new().range(1..)
    )]
    tick_ms: u64,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Mask strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    /// Near-white HSV band.
    Hsv,
    /// Fixed luminance threshold.
    Grayscale,
}

/// Resize filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation.
    Triangle,
    /// Bicubic Catmull-Rom.
    CatmullRom,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Overlay rendering is turned
/// on whenever `--overlay` is given.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    let mut config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        PipelineConfig {
            mask: MaskConfig {
                resize_filter: match cli.resize_filter {
                    Filter::Nearest => ResizeFilter::Nearest,
                    Filter::Triangle => ResizeFilter::Triangle,
                    Filter::CatmullRom => ResizeFilter::CatmullRom,
                    Filter::Lanczos3 => ResizeFilter::Lanczos3,
                },
                strategy: match cli.strategy {
                    Strategy::Hsv => MaskStrategy::HsvRange(HsvBand::WHITE_MARKINGS),
                    Strategy::Grayscale => MaskStrategy::Grayscale {
                        threshold: cli.gray_threshold,
                    },
                },
                min_component_size: cli.min_component_size,
                connectivity: if cli.four_connected {
                    Connectivity::Four
                } else {
                    Connectivity::Eight
                },
                ..MaskConfig::default()
            },
            estimator: EstimatorConfig {
                y_min: cli.y_min,
                y_max: cli.y_max,
                min_pixels: cli.min_pixels,
                lane_width: cli.lane_width,
                overlay: false,
            },
            steering: SteeringConfig {
                deadband: cli.deadband,
                kp: cli.kp,
                max_hold: Duration::from_millis(cli.max_hold_ms),
                ..SteeringConfig::default()
            },
        }
    };
    config.estimator.overlay |= cli.overlay.is_some();
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let frame = match image::open(&cli.image_path) {
        Ok(image) => image.to_rgb8(),
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Frame: {} ({}x{})",
        cli.image_path.display(),
        frame.width(),
        frame.height(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!();

    let (outcome, diagnostics) =
        match process_frame_with_diagnostics(&frame, &config, cli.previous_center, &WallClock) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        };

    if cli.json {
        match serde_json::to_string_pretty(&diagnostics) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing diagnostics: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", diagnostics.report());
        if let Some(command) = outcome.command {
            println!(
                "Pulse: {} for {:.3}s, release {:.3}s",
                command.direction,
                command.hold.as_secs_f64(),
                command.release.as_secs_f64(),
            );
        }
        println!("Next anchor: {}", outcome.path.previous_center);
    }

    if let Some(ref path) = cli.overlay
        && let Some(ref overlay) = outcome.path.overlay
    {
        match overlay.save(path) {
            Ok(()) => eprintln!("Overlay written to {}", path.display()),
            Err(e) => eprintln!("Error writing overlay to {}: {e}", path.display()),
        }
    }

    if cli.runs > 1 {
        let mut totals = vec![diagnostics.total_duration];
        for _ in 1..cli.runs {
            match process_frame_with_diagnostics(&frame, &config, cli.previous_center, &WallClock)
            {
                Ok((_, d)) => totals.push(d.total_duration),
                Err(e) => {
                    eprintln!("Pipeline error: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        print_timing_summary(&totals, Duration::from_millis(cli.tick_ms));
    }

    ExitCode::SUCCESS
}

/// Pipeline time per tick across runs, against the tick period.
#[derive(Debug, PartialEq, Eq)]
struct TimingSummary {
    runs: usize,
    min: Duration,
    mean: Duration,
    max: Duration,
    over_budget: usize,
    tick_period: Duration,
}

impl TimingSummary {
    fn new(totals: &[Duration], tick_period: Duration) -> Self {
        let sum: Duration = totals.iter().sum();
        Self {
            runs: totals.len(),
            min: totals.iter().copied().min().unwrap_or_default(),
            mean: sum
                .checked_div(u32::try_from(totals.len()).unwrap_or(u32::MAX))
                .unwrap_or_default(),
            max: totals.iter().copied().max().unwrap_or_default(),
            over_budget: totals.iter().filter(|&&d| d > tick_period).count(),
            tick_period,
        }
    }

    /// Mean pipeline time as a percentage of the tick period.
    const fn budget_used(&self) -> f64 {
        self.mean.as_secs_f64() / self.tick_period.as_secs_f64() * 100.0
    }
}

fn print_timing_summary(totals: &[Duration], tick_period: Duration) {
    let summary = TimingSummary::new(totals, tick_period);
    let ms = |d: Duration| d.as_secs_f64() * 1000.0;

    println!();
    println!("Timing ({} runs)\n{}", summary.runs, "=".repeat(60));
    println!(
        "Pipeline: min={:.3}ms  mean={:.3}ms  max={:.3}ms",
        ms(summary.min),
        ms(summary.mean),
        ms(summary.max)
    );
    println!(
        "Tick period {:.0}ms: mean uses {:.1}%, {} run(s) over budget",
        ms(summary.tick_period),
        summary.budget_used(),
        summary.over_budget,
    );
}
