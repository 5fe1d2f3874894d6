//! Steering law: lateral offset in, bounded actuation pulse out.
//!
//! Each tick emits at most one press-and-release pulse. Offsets inside
//! the dead-band produce no pulse; outside it the press duration is
//! proportional to the offset and clamped to `max_hold`. The release
//! duration is fixed.
//!
//! Direction follows the offset sign: positive steers right, negative
//! steers left.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::duration_serde;
use crate::types::PipelineError;

/// Which way to steer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteerDirection {
    /// Steer left.
    Left,
    /// Steer right.
    Right,
    /// No actuation.
    None,
}

impl fmt::Display for SteerDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
            Self::None => f.write_str("none"),
        }
    }
}

/// One actuation pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteerCommand {
    /// Which way to steer.
    pub direction: SteerDirection,
    /// How long the steering input is held.
    #[serde(with = "duration_serde")]
    pub hold: Duration,
    /// Pause after releasing the input.
    #[serde(with = "duration_serde")]
    pub release: Duration,
}

impl SteerCommand {
    /// The no-op command.
    pub const NONE: Self = Self {
        direction: SteerDirection::None,
        hold: Duration::ZERO,
        release: Duration::ZERO,
    };

    /// Whether this command actuates anything.
    #[must_use]
    pub fn is_actuation(&self) -> bool {
        self.direction != SteerDirection::None
    }
}

/// Configuration for [`compute_command`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Offsets with magnitude below this many pixels are ignored.
    pub deadband: u32,
    /// Proportional gain in seconds of hold per pixel of offset.
    pub kp: f64,
    /// Upper bound on the hold duration.
    #[serde(with = "duration_serde")]
    pub max_hold: Duration,
    /// Fixed release duration after each pulse.
    #[serde(with = "duration_serde")]
    pub release: Duration,
}

impl SteeringConfig {
    /// Default dead-band in pixels.
    pub const DEFAULT_DEADBAND: u32 = 20;
    /// Default proportional gain.
    pub const DEFAULT_KP: f64 = 4e-3;
    /// Default maximum hold.
    pub const DEFAULT_MAX_HOLD: Duration = Duration::from_millis(300);
    /// Default release.
    pub const DEFAULT_RELEASE: Duration = Duration::from_millis(50);

    /// Check that the gain is a finite non-negative number.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a negative or
    /// non-finite `kp`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.kp.is_finite() || self.kp < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "steering gain must be finite and non-negative, got {}",
                self.kp,
            )));
        }
        Ok(())
    }
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            deadband: Self::DEFAULT_DEADBAND,
            kp: Self::DEFAULT_KP,
            max_hold: Self::DEFAULT_MAX_HOLD,
            release: Self::DEFAULT_RELEASE,
        }
    }
}

/// Map a lateral offset to a steering pulse.
#[must_use]
pub fn compute_command(offset: i32, config: &SteeringConfig) -> SteerCommand {
    let magnitude = offset.unsigned_abs();
    if magnitude < config.deadband {
        return SteerCommand::NONE;
    }

    let hold_secs = (f64::from(magnitude) * config.kp).min(config.max_hold.as_secs_f64());
    let hold = duration_serde::from_secs_rounded(hold_secs).unwrap_or(Duration::ZERO);
    let direction = if offset > 0 {
        SteerDirection::Right
    } else {
        SteerDirection::Left
    };

    SteerCommand {
        direction,
        hold,
        release: config.release,
    }
}
