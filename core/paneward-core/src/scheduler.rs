//! Fixed-interval snapshot driver.
//!
//! One worker thread runs the pass every interval. Stopping drops the
//! channel sender, which wakes the worker out of its wait; a pass already
//! running finishes on its own unless the caller joins it. Nothing is written on the way out, so a
//! host that kills the process without notice loses at most one interval.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct SnapshotScheduler {
    worker: Mutex<Option<Worker>>,
}

impl SnapshotScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `pass` every `interval` until stopped. Starting again replaces
    /// the running worker once its in-flight pass (if any) has finished, so
    /// at most one worker ever runs.
    pub fn start<F>(&self, interval: Duration, pass: F)
    where
        F: Fn() + Send + 'static,
    {
        let mut slot = self.lock();
        if let Some(previous) = slot.take() {
            debug!("Re-arming snapshot scheduler");
            drop(previous.stop);
            if previous.handle.join().is_err() {
                warn!("Snapshot worker panicked");
            }
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("paneward-snapshot".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => pass(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match spawned {
            Ok(handle) => {
                debug!(interval_ms = interval.as_millis() as u64, "Snapshot scheduler started");
                *slot = Some(Worker { stop, handle });
            }
            Err(err) => warn!(error = %err, "Failed to spawn snapshot worker"),
        }
    }

    /// Cancels the timer. Does not wait for an in-flight pass.
    pub fn stop(&self) {
        if let Some(worker) = self.lock().take() {
            drop(worker.stop);
            debug!("Snapshot scheduler stopped");
        }
    }

    /// Cancels the timer and waits for the worker to exit.
    pub fn stop_and_join(&self) {
        let worker = self.lock().take();
        if let Some(worker) = worker {
            drop(worker.stop);
            if worker.handle.join().is_err() {
                warn!("Snapshot worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn wait_until(deadline: Duration, check: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        check()
    }

    #[test]
    fn test_runs_passes_until_stopped() {
        let scheduler = SnapshotScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        scheduler.start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.is_running());
        assert!(wait_until(Duration::from_secs(5), || count.load(Ordering::SeqCst) >= 3));

        scheduler.stop_and_join();
        assert!(!scheduler.is_running());
        let after_stop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_restart_replaces_previous_worker() {
        let scheduler = SnapshotScheduler::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        scheduler.start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(wait_until(Duration::from_secs(5), || first.load(Ordering::SeqCst) >= 1));

        let counter = Arc::clone(&second);
        scheduler.start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(wait_until(Duration::from_secs(5), || second.load(Ordering::SeqCst) >= 2));

        // The first worker was joined before the second started.
        let settled = first.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(first.load(Ordering::SeqCst), settled);
        scheduler.stop_and_join();
    }

    #[test]
    fn test_restart_waits_for_in_flight_pass() {
        let scheduler = SnapshotScheduler::new();
        let running = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));

        let pass = |running: Arc<AtomicUsize>, overlap: Arc<AtomicUsize>| {
            move || {
                if running.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(100));
                running.fetch_sub(1, Ordering::SeqCst);
            }
        };

        scheduler.start(
            Duration::from_millis(5),
            pass(Arc::clone(&running), Arc::clone(&overlap)),
        );
        assert!(wait_until(Duration::from_secs(5), || running.load(Ordering::SeqCst) == 1));
        scheduler.start(
            Duration::from_millis(5),
            pass(Arc::clone(&running), Arc::clone(&overlap)),
        );
        thread::sleep(Duration::from_millis(150));
        scheduler.stop_and_join();
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_without_start_is_harmless() {
        let scheduler = SnapshotScheduler::new();
        scheduler.stop();
        scheduler.stop_and_join();
        assert!(!scheduler.is_running());
    }
}
