// Periodic job harness: one thread per job, wall-clock time injected into
// each tick, and a non-blocking guard so a tick that is still running when
// the next is due causes a skip, never a queue. Manual triggers share the
// same guard as the timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}

/// Non-blocking per-job mutual exclusion flag.
pub struct TickGuard {
    running: AtomicBool,
}

impl TickGuard {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }

    /// Run `f` if no other tick of this job is in flight; None means the
    /// tick was skipped.
    pub fn try_run<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        let out = f();
        self.running.store(false, Ordering::Release);
        Some(out)
    }
}

impl Default for TickGuard {
    fn default() -> Self {
        Self::new()
    }
}

pub struct JobHandle {
    shutdown: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl JobHandle {
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.handle.join();
    }
}

/// Spawn a named periodic job. The job receives the wall-clock time of its
/// tick; `shutdown` is shared so callers can also hand it to the job body
/// for cooperative cancellation inside a tick.
pub fn spawn_periodic<F>(
    name: &str,
    interval: Duration,
    guard: Arc<TickGuard>,
    shutdown: Arc<AtomicBool>,
    mut job: F,
) -> JobHandle
where
    F: FnMut(u64) + Send + 'static,
{
    let name = name.to_string();
    let shutdown_in = Arc::clone(&shutdown);
    let handle = thread::spawn(move || {
        while !shutdown_in.load(Ordering::Relaxed) {
            let now = now_ms();
            if guard.try_run(|| job(now)).is_none() {
                eprintln!("{}: previous tick still running; skipping", name);
            }

            // Sleep in short slices so shutdown is honored promptly.
            let mut remaining = interval;
            while remaining > Duration::ZERO && !shutdown_in.load(Ordering::Relaxed) {
                let slice = remaining.min(Duration::from_millis(50));
                thread::sleep(slice);
                remaining = remaining.saturating_sub(slice);
            }
        }
    });
    JobHandle { shutdown, handle }
}
