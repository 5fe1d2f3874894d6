//! Failure supervisor: decides when to hand control to the recovery
//! behavior.
//!
//! Keeps a sliding window of the most recent tick outcomes. Recovery is
//! due exactly when every entry in the window is a failure. The window
//! starts full of successes, so a fresh supervisor needs `window`
//! consecutive failures before it fires.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Configuration for [`FailureSupervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Number of recent outcomes considered.
    pub window: usize,
}

impl SupervisorConfig {
    /// Default window length.
    pub const DEFAULT_WINDOW: usize = 3;

    /// Check that the window is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a zero window.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.window == 0 {
            return Err(PipelineError::InvalidConfig(
                "supervisor window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            window: Self::DEFAULT_WINDOW,
        }
    }
}

/// Sliding window of recent tick outcomes.
#[derive(Debug, Clone)]
pub struct FailureSupervisor {
    recent: VecDeque<bool>,
    window: usize,
}

impl FailureSupervisor {
    /// Create a supervisor primed with successes.
    ///
    /// A zero window is treated as a window of one.
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        let window = config.window.max(1);
        Self {
            recent: std::iter::repeat_n(true, window).collect(),
            window,
        }
    }

    /// Record one tick outcome and report whether recovery is due.
    #[must_use = "the return value says whether to trigger recovery"]
    pub fn record(&mut self, success: bool) -> bool {
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(success);
        self.recovery_due()
    }

    /// Whether every outcome in the window is a failure.
    #[must_use]
    pub fn recovery_due(&self) -> bool {
        self.recent.iter().all(|&ok| !ok)
    }

    /// Refill the window with successes, e.g. after a recovery.
    pub fn reset(&mut self) {
        self.recent.iter_mut().for_each(|ok| *ok = true);
    }

    /// The window contents, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<bool> {
        self.recent.iter().copied().collect()
    }
}

impl Default for FailureSupervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_supervisor_is_primed_with_successes() {
        let sup = FailureSupervisor::default();
        assert_eq!(sup.recent(), vec![true, true, true]);
        assert!(!sup.recovery_due());
    }

    #[test]
    fn three_failures_trigger_and_one_success_clears() {
        let mut sup = FailureSupervisor::default();
        assert!(!sup.record(false));
        assert!(!sup.record(false));
        assert!(sup.record(false));
        assert!(!sup.record(true));
        assert!(!sup.record(false));
        assert!(!sup.record(false));
        assert!(sup.record(false));
    }

    #[test]
    fn interleaved_outcomes_never_trigger() {
        let mut sup = FailureSupervisor::default();
        for i in 0..20 {
            assert!(!sup.record(i % 3 == 0));
        }
    }

    #[test]
    fn reset_requires_a_full_window_again() {
        let mut sup = FailureSupervisor::default();
        for _ in 0..3 {
            let _ = sup.record(false);
        }
        assert!(sup.recovery_due());
        sup.reset();
        assert!(!sup.recovery_due());
        assert!(!sup.record(false));
        assert!(!sup.record(false));
        assert!(sup.record(false));
    }

    #[test]
    fn window_of_one_triggers_on_every_failure() {
        let mut sup = FailureSupervisor::new(SupervisorConfig { window: 1 });
        assert!(sup.record(false));
        assert!(!sup.record(true));
        assert!(sup.record(false));
    }

    #[test]
    fn zero_window_is_invalid() {
        assert!(SupervisorConfig { window: 0 }.validate().is_err());
        let sup = FailureSupervisor::new(SupervisorConfig { window: 0 });
        assert_eq!(sup.recent().len(), 1);
    }
}
