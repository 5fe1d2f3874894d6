//! Run/pause/exit signalling between the tick thread and everyone else.
//!
//! Two flags carry the state: `running` (run vs. pause) and `exit`.
//! Handles on other threads only write them; the tick thread only reads
//! them. Every write is followed by a wake-up on a channel so a sleeping
//! tick thread notices at once instead of at its next timeout.
//!
//! Synchronization: writers store with `Release`, the tick thread loads
//! with `Acquire`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, tick thread not started.
    Idle,
    /// Ticking.
    Running,
    /// Tick thread alive but not invoking the pipeline.
    Paused,
    /// Shutdown requested or the session ended.
    Exiting,
}

#[derive(Debug, Default)]
struct ControlFlags {
    started: AtomicBool,
    running: AtomicBool,
    exit: AtomicBool,
}

impl ControlFlags {
    fn state(&self) -> RunState {
        if self.exit.load(Ordering::Acquire) {
            RunState::Exiting
        } else if !self.started.load(Ordering::Acquire) {
            RunState::Idle
        } else if self.running.load(Ordering::Acquire) {
            RunState::Running
        } else {
            RunState::Paused
        }
    }
}

/// Cloneable handle for steering the scheduler from any thread.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    flags: Arc<ControlFlags>,
    wake: Sender<()>,
}

impl ControlHandle {
    /// Stop invoking the pipeline until resumed.
    pub fn pause(&self) {
        self.flags.running.store(false, Ordering::Release);
        tracing::info!("pause requested");
        self.notify();
    }

    /// Resume ticking after a pause.
    pub fn resume(&self) {
        self.flags.running.store(true, Ordering::Release);
        tracing::info!("resume requested");
        self.notify();
    }

    /// Flip between running and paused.
    pub fn toggle_pause(&self) {
        let was_running = self.flags.running.fetch_xor(true, Ordering::AcqRel);
        tracing::info!(paused = was_running, "pause toggled");
        self.notify();
    }

    /// Ask the tick thread to exit. Idempotent.
    pub fn shutdown(&self) {
        if !self.flags.exit.swap(true, Ordering::AcqRel) {
            tracing::info!("shutdown requested");
        }
        self.notify();
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.flags.state()
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_exit_requested(&self) -> bool {
        self.flags.exit.load(Ordering::Acquire)
    }

    pub(crate) fn mark_started(&self) {
        self.flags.running.store(true, Ordering::Release);
        self.flags.started.store(true, Ordering::Release);
    }

    pub(crate) fn mark_finished(&self) {
        self.flags.exit.store(true, Ordering::Release);
    }

    fn notify(&self) {
        // The receiver is gone once the tick thread has exited.
        let _ = self.wake.send(());
    }
}

/// Tick-thread side: reads the flags and sleeps interruptibly.
#[derive(Debug)]
pub(crate) struct Pacer {
    flags: Arc<ControlFlags>,
    wake: Receiver<()>,
}

/// Create a connected handle and pacer.
pub(crate) fn channel() -> (ControlHandle, Pacer) {
    let flags = Arc::new(ControlFlags::default());
    let (tx, rx) = mpsc::channel();
    (
        ControlHandle {
            flags: Arc::clone(&flags),
            wake: tx,
        },
        Pacer { flags, wake: rx },
    )
}

impl Pacer {
    pub(crate) fn state(&self) -> RunState {
        self.flags.state()
    }

    pub(crate) fn is_exit_requested(&self) -> bool {
        self.flags.exit.load(Ordering::Acquire)
    }

    /// Mark the session as over so the state reads `Exiting`.
    pub(crate) fn finish(&self) {
        self.flags.exit.store(true, Ordering::Release);
    }

    /// Sleep until `deadline` unless shutdown is requested first.
    ///
    /// Returns `false` if interrupted by shutdown.
    pub(crate) fn sleep_until(&self, deadline: Instant) -> bool {
        loop {
            if self.is_exit_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            match self.wake.recv_timeout(deadline - now) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => return !self.is_exit_requested(),
                Err(RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    return !self.is_exit_requested();
                }
            }
        }
    }

    /// Block for at most `poll` while paused. Returns early on any
    /// control change.
    pub(crate) fn wait_while_paused(&self, poll: Duration) {
        if self.state() != RunState::Paused {
            return;
        }
        match self.wake.recv_timeout(poll) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => std::thread::sleep(poll),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn lifecycle_states() {
        let (handle, pacer) = channel();
        assert_eq!(handle.state(), RunState::Idle);
        handle.mark_started();
        assert_eq!(pacer.state(), RunState::Running);
        handle.pause();
        assert_eq!(pacer.state(), RunState::Paused);
        handle.toggle_pause();
        assert_eq!(pacer.state(), RunState::Running);
        handle.toggle_pause();
        assert_eq!(pacer.state(), RunState::Paused);
        handle.resume();
        assert_eq!(pacer.state(), RunState::Running);
        handle.shutdown();
        handle.shutdown();
        assert_eq!(pacer.state(), RunState::Exiting);
    }

    #[test]
    fn sleep_runs_to_deadline() {
        let (_handle, pacer) = channel();
        let start = Instant::now();
        assert!(pacer.sleep_until(start + Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn shutdown_interrupts_sleep() {
        let (handle, pacer) = channel();
        let start = Instant::now();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.shutdown();
        });
        assert!(!pacer.sleep_until(start + Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(10));
        waker.join().unwrap();
    }

    #[test]
    fn resume_ends_a_pause_wait_early() {
        let (handle, pacer) = channel();
        handle.mark_started();
        handle.pause();
        // Drain the pause notification.
        pacer.wait_while_paused(Duration::from_millis(1));
        let start = Instant::now();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.resume();
        });
        pacer.wait_while_paused(Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(pacer.state(), RunState::Running);
        waker.join().unwrap();
    }

    #[test]
    fn shutdown_ends_a_pause_wait_early() {
        let (handle, pacer) = channel();
        handle.mark_started();
        handle.pause();
        pacer.wait_while_paused(Duration::from_millis(1));
        let start = Instant::now();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.shutdown();
        });
        pacer.wait_while_paused(Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(pacer.state(), RunState::Exiting);
        waker.join().unwrap();
    }
}
