//! Session configuration: pipeline, supervisor and scheduler settings
//! in one immutable value, loaded from JSON.

use std::path::Path;

use lanekeep_pipeline::{PipelineConfig, SupervisorConfig};
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::scheduler::SchedulerConfig;

/// Everything a driving session is configured with.
///
/// Missing sections and fields take their defaults, so a partial file
/// such as `{"estimator": ...}` nested under `pipeline` is valid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Per-frame pipeline.
    pub pipeline: PipelineConfig,
    /// Failure window.
    pub supervisor: SupervisorConfig,
    /// Tick cadence and recovery timing.
    pub scheduler: SchedulerConfig,
}

impl SessionConfig {
    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] describing the first violated
    /// constraint.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        self.pipeline.validate()?;
        self.supervisor.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Json`] for malformed input and
    /// [`RuntimeError::Config`] for invalid values.
    pub fn from_json(json: &str) -> Result<Self, RuntimeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Io`] if the file cannot be read, otherwise
    /// as [`from_json`](Self::from_json).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&json)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded session configuration");
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_validate() {
        SessionConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = SessionConfig::from_json(
            r#"{
                "pipeline": { "estimator": { "lane_width": 370 } },
                "scheduler": { "tick_period": 0.5 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.estimator.lane_width, 370);
        assert_eq!(config.scheduler.tick_period, Duration::from_millis(500));
        assert_eq!(config.supervisor, SupervisorConfig::default());
    }

    #[test]
    fn grayscale_strategy_from_json() {
        let config = SessionConfig::from_json(
            r#"{ "pipeline": { "mask": { "strategy": { "kind": "grayscale", "threshold": 160 } } } }"#,
        )
        .unwrap();
        assert_eq!(
            config.pipeline.mask.strategy,
            lanekeep_pipeline::MaskStrategy::Grayscale { threshold: 160 }
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = SessionConfig::from_json(r#"{ "supervisor": { "window": 0 } }"#).unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
        let err = SessionConfig::from_json(r#"{ "scheduler": { "tick_period": -1.0 } }"#).unwrap_err();
        assert!(matches!(err, RuntimeError::Json(_)));
        let err = SessionConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, RuntimeError::Json(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SessionConfig::load("/nonexistent/lanekeep/session.json").unwrap_err();
        assert!(matches!(err, RuntimeError::Io(_)));
    }
}
