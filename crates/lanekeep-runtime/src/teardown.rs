//! Ordered, exactly-once release of session resources.
//!
//! Each resource is registered with a release closure. [`Teardown::run`]
//! calls them in registration order. A closure is taken out of its slot
//! before it runs, so a resource is never released twice no matter how
//! often `run` is called. A failing or panicking release is logged and
//! recorded, and the remaining resources are still released.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::tick::panic_message;

/// Release closure for one resource.
pub type ReleaseFn = Box<dyn FnOnce() -> Result<(), CollaboratorError> + Send>;

/// How releasing one resource went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// Released cleanly.
    Released,
    /// The release returned an error.
    Failed(String),
    /// The release panicked.
    Panicked(String),
}

/// One teardown step as it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownRecord {
    /// Resource name.
    pub name: String,
    /// What happened.
    pub outcome: ReleaseOutcome,
}

struct Resource {
    name: String,
    release: Option<ReleaseFn>,
}

/// Resources awaiting release, in release order.
#[derive(Default)]
pub struct Teardown {
    resources: Vec<Resource>,
}

impl Teardown {
    /// Empty teardown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource; it is released after everything pushed before it.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        release: impl FnOnce() -> Result<(), CollaboratorError> + Send + 'static,
    ) {
        self.push_boxed(name.into(), Box::new(release));
    }

    pub(crate) fn push_boxed(&mut self, name: String, release: ReleaseFn) {
        self.resources.push(Resource {
            name,
            release: Some(release),
        });
    }

    /// Number of resources not yet released.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.release.is_some())
            .count()
    }

    /// Release every pending resource in order.
    ///
    /// Returns one record per resource released by this call; a second
    /// call returns an empty list.
    pub fn run(&mut self) -> Vec<TeardownRecord> {
        let mut records = Vec::new();
        for resource in &mut self.resources {
            let Some(release) = resource.release.take() else {
                continue;
            };
            let outcome = match panic::catch_unwind(AssertUnwindSafe(release)) {
                Ok(Ok(())) => {
                    tracing::debug!(resource = %resource.name, "released");
                    ReleaseOutcome::Released
                }
                Ok(Err(e)) => {
                    tracing::error!(resource = %resource.name, error = %e, "release failed");
                    ReleaseOutcome::Failed(e.to_string())
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref()).to_string();
                    tracing::error!(resource = %resource.name, panic = %message, "release panicked");
                    ReleaseOutcome::Panicked(message)
                }
            };
            records.push(TeardownRecord {
                name: resource.name.clone(),
                outcome,
            });
        }
        records
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown")
            .field(
                "resources",
                &self.resources.iter().map(|r| &r.name).collect::<Vec<_>>(),
            )
            .field("pending", &self.pending())
            .finish()
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if self.pending() > 0 {
            let _ = self.run();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) + Clone) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |name| sink.lock().unwrap().push(name))
    }

    #[test]
    fn releases_in_order_once() {
        let (log, record) = recorder();
        let mut teardown = Teardown::new();
        for name in ["sink", "listener", "driver"] {
            let record = record.clone();
            teardown.push(name, move || {
                record(name);
                Ok(())
            });
        }
        assert_eq!(teardown.pending(), 3);

        let records = teardown.run();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.outcome == ReleaseOutcome::Released));
        assert_eq!(*log.lock().unwrap(), vec!["sink", "listener", "driver"]);

        assert!(teardown.run().is_empty());
        assert_eq!(log.lock().unwrap().len(), 3);
        assert_eq!(teardown.pending(), 0);
    }

    #[test]
    fn failures_and_panics_do_not_stop_later_steps() {
        let (log, record) = recorder();
        let mut teardown = Teardown::new();
        teardown.push("failing", || Err(CollaboratorError::failed("busy")));
        teardown.push("panicking", || panic!("boom"));
        let last = record.clone();
        teardown.push("last", move || {
            last("last");
            Ok(())
        });

        let records = teardown.run();
        assert_eq!(
            records.iter().map(|r| r.outcome.clone()).collect::<Vec<_>>(),
            vec![
                ReleaseOutcome::Failed("busy".to_string()),
                ReleaseOutcome::Panicked("boom".to_string()),
                ReleaseOutcome::Released,
            ]
        );
        assert_eq!(*log.lock().unwrap(), vec!["last"]);
    }

    #[test]
    fn drop_releases_pending_resources() {
        let (log, record) = recorder();
        {
            let mut teardown = Teardown::new();
            teardown.push("late", move || {
                record("late");
                Ok(())
            });
        }
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }
}
