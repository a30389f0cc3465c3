use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub label: &'static str,
}

/// Shown while a request is pending. These are timed steps, not measured
/// progress; the reporter holds at the last one.
pub const PROGRESS_STEPS: [ProgressUpdate; 5] = [
    ProgressUpdate {
        percent: 10,
        label: "Uploading images",
    },
    ProgressUpdate {
        percent: 30,
        label: "Analyzing pose",
    },
    ProgressUpdate {
        percent: 50,
        label: "Fitting garment",
    },
    ProgressUpdate {
        percent: 70,
        label: "Rendering details",
    },
    ProgressUpdate {
        percent: 90,
        label: "Finishing up",
    },
];

/// Reported once when a request settles with a result.
pub const PROGRESS_COMPLETE: ProgressUpdate = ProgressUpdate {
    percent: 100,
    label: "Done",
};

pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

struct ProgressTask {
    stop_tx: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// Owns at most one timer thread walking [`PROGRESS_STEPS`].
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    interval: Duration,
    task: Option<ProgressTask>,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            task: None,
        }
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(|_: ProgressUpdate| {}), Duration::from_millis(500))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }

    /// Starts a fresh step sequence, stopping any previous one first.
    pub fn start(&mut self) {
        self.stop();

        let (stop_tx, stop_rx) = mpsc::channel();
        let sink = Arc::clone(&self.sink);
        let interval = self.interval;
        match thread::Builder::new()
            .name("tryon-progress".to_string())
            .spawn(move || run_steps(sink.as_ref(), &stop_rx, interval))
        {
            Ok(handle) => self.task = Some(ProgressTask { stop_tx, handle }),
            Err(err) => tracing::warn!(error = %err, "progress thread spawn failed"),
        }
    }

    /// Stops and joins the timer thread. No update is delivered after this
    /// returns. Returns `false` when nothing was running.
    pub fn stop(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };
        let _ = task.stop_tx.send(());
        if task.handle.join().is_err() {
            tracing::warn!("progress thread panicked");
        }
        true
    }

    /// Stops the timer and reports [`PROGRESS_COMPLETE`]. Does nothing when
    /// no sequence was running.
    pub fn finish(&mut self) -> bool {
        if !self.stop() {
            return false;
        }
        self.sink.report(PROGRESS_COMPLETE);
        true
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_steps(sink: &dyn ProgressSink, stop_rx: &mpsc::Receiver<()>, interval: Duration) {
    let mut steps = PROGRESS_STEPS.iter();
    if let Some(first) = steps.next() {
        sink.report(*first);
    }
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                if let Some(step) = steps.next() {
                    sink.report(*step);
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use super::{ProgressReporter, ProgressUpdate, PROGRESS_COMPLETE, PROGRESS_STEPS};

    fn recording_reporter(interval_ms: u64) -> (ProgressReporter, Arc<Mutex<Vec<ProgressUpdate>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let reporter = ProgressReporter::new(
            Arc::new(move |update: ProgressUpdate| {
                if let Ok(mut rows) = sink_seen.lock() {
                    rows.push(update);
                }
            }),
            Duration::from_millis(interval_ms),
        );
        (reporter, seen)
    }

    fn snapshot(seen: &Arc<Mutex<Vec<ProgressUpdate>>>) -> Vec<ProgressUpdate> {
        seen.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    #[test]
    fn walks_steps_in_order_and_holds_at_last() {
        let (mut reporter, seen) = recording_reporter(5);
        reporter.start();
        thread::sleep(Duration::from_millis(200));
        assert!(reporter.stop());

        let updates = snapshot(&seen);
        assert_eq!(updates, PROGRESS_STEPS.to_vec());
    }

    #[test]
    fn stop_is_idempotent_and_silences_the_sink() {
        let (mut reporter, seen) = recording_reporter(5);
        assert!(!reporter.stop());

        reporter.start();
        assert!(reporter.is_running());
        assert!(reporter.stop());
        assert!(!reporter.stop());
        assert!(!reporter.is_running());

        let after_stop = snapshot(&seen).len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(snapshot(&seen).len(), after_stop);
    }

    #[test]
    fn restart_replaces_the_running_task() {
        let (mut reporter, seen) = recording_reporter(1_000);
        reporter.start();
        reporter.start();
        assert!(reporter.is_running());
        assert!(reporter.stop());

        let updates = snapshot(&seen);
        assert_eq!(updates, vec![PROGRESS_STEPS[0], PROGRESS_STEPS[0]]);
    }

    #[test]
    fn finish_reports_complete_once() {
        let (mut reporter, seen) = recording_reporter(1_000);
        assert!(!reporter.finish());
        assert!(snapshot(&seen).is_empty());

        reporter.start();
        assert!(reporter.finish());
        assert!(!reporter.is_running());
        assert!(!reporter.finish());
        assert_eq!(snapshot(&seen), vec![PROGRESS_STEPS[0], PROGRESS_COMPLETE]);
    }

    #[test]
    fn drop_stops_the_task() {
        let (mut reporter, seen) = recording_reporter(5);
        reporter.start();
        drop(reporter);
        let after_drop = snapshot(&seen).len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(snapshot(&seen).len(), after_drop);
    }
}
