//! Visualization thread: the sink runs off the tick thread.
//!
//! The tick thread hands each tick's stats and overlay to a bounded
//! queue and never waits on it; when the queue is full that tick is not
//! shown. The visualization thread owns the sink until the tick thread
//! drops its end of the queue, drains what is left, and hands the sink
//! back for release.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use lanekeep_pipeline::RgbImage;

use crate::collaborators::VisualizationSink;
use crate::error::CollaboratorError;
use crate::tick::{TickStats, panic_message};

struct Publication {
    stats: TickStats,
    overlay: Option<RgbImage>,
}

/// Tick-thread end of the visualization queue.
pub(crate) struct Publisher {
    queue: SyncSender<Publication>,
    dropped: u64,
}

impl Publisher {
    /// Queue one tick for display without blocking.
    pub(crate) fn publish(&mut self, stats: TickStats, overlay: Option<RgbImage>) {
        let tick = stats.tick;
        match self.queue.try_send(Publication { stats, overlay }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::debug!(tick, dropped = self.dropped, "visualization queue full");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                tracing::warn!(tick, "visualization thread is gone");
            }
        }
    }

    /// Ticks that never reached the sink.
    pub(crate) const fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Handle to the thread that owns the sink.
pub(crate) struct VisualizationThread {
    thread: JoinHandle<Box<dyn VisualizationSink>>,
}

impl VisualizationThread {
    /// Wait for the queue to drain and take the sink back.
    ///
    /// Only returns once every [`Publisher`] is dropped.
    pub(crate) fn finish(self) -> Result<Box<dyn VisualizationSink>, CollaboratorError> {
        self.thread.join().map_err(|payload| {
            CollaboratorError::failed(format!(
                "visualization thread panicked: {}",
                panic_message(payload.as_ref())
            ))
        })
    }
}

/// Move `sink` onto its own thread behind a queue of `capacity` ticks.
pub(crate) fn spawn(
    sink: Box<dyn VisualizationSink>,
    capacity: usize,
) -> io::Result<(Publisher, VisualizationThread)> {
    let (queue, rx) = mpsc::sync_channel(capacity);
    let thread = thread::Builder::new()
        .name("lanekeep-viz".to_string())
        .spawn(move || run(sink, &rx))?;
    Ok((
        Publisher { queue, dropped: 0 },
        VisualizationThread { thread },
    ))
}

fn run(
    mut sink: Box<dyn VisualizationSink>,
    rx: &Receiver<Publication>,
) -> Box<dyn VisualizationSink> {
    for Publication { stats, overlay } in rx {
        let published =
            panic::catch_unwind(AssertUnwindSafe(|| sink.publish(overlay.as_ref(), &stats)));
        match published {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(tick = stats.tick, error = %e, "visualization publish failed"),
            Err(payload) => tracing::error!(
                tick = stats.tick,
                panic = panic_message(payload.as_ref()),
                "visualization publish panicked"
            ),
        }
    }
    tracing::debug!("visualization queue drained");
    sink
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::mpsc::Sender;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use super::*;

    fn stats(tick: u64) -> TickStats {
        TickStats {
            tick,
            success: true,
            offset: Some(0),
            lane_center: Some(320),
            boundary_index: Some(3),
            total_pixels: 40,
            anchor: 320,
            command: None,
            recovery: false,
            diagnostics: None,
        }
    }

    /// Blocks in `publish` until the gate receives a message.
    struct GatedSink {
        gate: Receiver<()>,
        entered: Sender<u64>,
        shown: Arc<Mutex<Vec<u64>>>,
    }

    impl VisualizationSink for GatedSink {
        fn publish(
            &mut self,
            _: Option<&RgbImage>,
            stats: &TickStats,
        ) -> Result<(), CollaboratorError> {
            let _ = self.entered.send(stats.tick);
            let _ = self.gate.recv();
            self.shown.lock().unwrap().push(stats.tick);
            Ok(())
        }
    }

    #[test]
    fn slow_sink_never_blocks_the_publisher() {
        let (open, gate) = mpsc::channel();
        let (entered_tx, entered) = mpsc::channel();
        let shown = Arc::new(Mutex::new(Vec::new()));
        let sink = GatedSink {
            gate,
            entered: entered_tx,
            shown: Arc::clone(&shown),
        };
        let (mut publisher, thread) = spawn(Box::new(sink), 2).unwrap();

        publisher.publish(stats(1), None);
        // Tick 1 is now held inside the sink.
        assert_eq!(entered.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

        let started = Instant::now();
        for tick in 2..=10 {
            publisher.publish(stats(tick), None);
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(publisher.dropped(), 7);

        for _ in 0..3 {
            open.send(()).unwrap();
        }
        drop(publisher);
        thread.finish().unwrap();
        assert_eq!(*shown.lock().unwrap(), vec![1, 2, 3]);
    }

    struct FlakySink {
        shown: Arc<Mutex<Vec<u64>>>,
    }

    impl VisualizationSink for FlakySink {
        fn publish(
            &mut self,
            _: Option<&RgbImage>,
            stats: &TickStats,
        ) -> Result<(), CollaboratorError> {
            match stats.tick {
                2 => Err(CollaboratorError::failed("window closed")),
                3 => panic!("renderer crashed"),
                tick => {
                    self.shown.lock().unwrap().push(tick);
                    Ok(())
                }
            }
        }
    }

    #[test]
    fn failing_and_panicking_publishes_keep_the_thread_alive() {
        let shown = Arc::new(Mutex::new(Vec::new()));
        let sink = FlakySink {
            shown: Arc::clone(&shown),
        };
        let (mut publisher, thread) = spawn(Box::new(sink), 8).unwrap();
        for tick in 1..=4 {
            publisher.publish(stats(tick), None);
        }
        assert_eq!(publisher.dropped(), 0);
        drop(publisher);

        let mut sink = thread.finish().unwrap();
        sink.release().unwrap();
        assert_eq!(*shown.lock().unwrap(), vec![1, 4]);
    }
}
