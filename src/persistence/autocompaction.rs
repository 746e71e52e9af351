use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Minimum autocompaction interval; a shorter requested interval is clamped
/// up to this floor.
pub const MIN_INTERVAL: Duration = Duration::from_secs(5);

/// How often the timer thread wakes to re-check the stop flag while waiting
/// out an interval, so `stop()` doesn't block for up to a full interval.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A running autocompaction timer. Dropping or replacing it via
/// [`AutocompactionHandle::stop`] cancels the pending tick, never a
/// compaction already in progress.
pub struct AutocompactionHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AutocompactionHandle {
    /// Spawns the timer thread. `compact` runs on each tick where
    /// `written_count >= min_writes`; the next tick is armed only once
    /// `compact` returns, so overlapping runs are impossible.
    pub fn start<F>(interval: Duration, min_writes: u64, written_count: Arc<AtomicU64>, compact: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let interval = interval.max(MIN_INTERVAL);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);

        let thread = std::thread::spawn(move || {
            while !stop_for_thread.load(Ordering::SeqCst) {
                if !wait_out_interval(interval, &stop_for_thread) {
                    break;
                }
                if written_count.load(Ordering::SeqCst) >= min_writes {
                    compact();
                }
            }
        });

        AutocompactionHandle {
            stop,
            thread: Some(thread),
        }
    }

    /// Cancels the pending tick and returns once the timer thread has
    /// noticed, which happens within one [`POLL_INTERVAL`] regardless of how
    /// long `interval` is. Does not wait for a currently-running compaction.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for AutocompactionHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Sleeps out `total` in `POLL_INTERVAL`-sized steps, checking `stop` between
/// each one. Returns `false` as soon as a stop is observed, without waiting
/// for the rest of `total`; returns `true` if `total` elapsed undisturbed.
fn wait_out_interval(total: Duration, stop: &AtomicBool) -> bool {
    let mut remaining = total;
    while remaining > Duration::from_millis(0) {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(POLL_INTERVAL);
        std::thread::sleep(step);
        remaining -= step;
    }
    !stop.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[test]
    fn interval_is_clamped_to_five_seconds() {
        let written = Arc::new(AtomicU64::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let runs2 = Arc::clone(&runs);
        let handle = AutocompactionHandle::start(Duration::from_millis(1), 1_000_000, written, move || {
            runs2.fetch_add(1, Ordering::SeqCst);
        });
        // With a 5s floor and an impossible min_writes, nothing should have
        // run yet even after a short wait.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        handle.stop();
    }

    #[test]
    fn skips_compaction_below_min_writes() {
        let written = Arc::new(AtomicU64::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let runs2 = Arc::clone(&runs);
        // MIN_INTERVAL floors this at 5s; stop() must still return promptly.
        let handle = AutocompactionHandle::start(MIN_INTERVAL, 5, written, move || {
            runs2.fetch_add(1, Ordering::SeqCst);
        });
        handle.stop();
    }

    #[test]
    fn stop_returns_well_before_the_interval_elapses() {
        let written = Arc::new(AtomicU64::new(0));
        let handle = AutocompactionHandle::start(MIN_INTERVAL, 1, written, || {});

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
