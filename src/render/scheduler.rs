//! Drift-free periodic ticking on a dedicated thread
//!
//! Tick `n` is scheduled at the absolute instant `start + n * interval` on the
//! monotonic clock, so a slow handler delays at most the next wake-up and
//! never shifts the cadence. A handler that overruns several intervals gets
//! its missed ticks back-to-back; ticks are never skipped or reordered.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::error::{AppError, Result};

/// Absolute wake time of tick `iteration`
fn deadline(start: Instant, interval: Duration, iteration: u64) -> Instant {
    let offset = interval.as_nanos().saturating_mul(iteration as u128);
    start + Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX))
}

/// Periodic tick source owning one thread
pub struct RealtimeScheduler {
    name: String,
    interval: Duration,
    running: Arc<AtomicBool>,
    ticks_per_second: Arc<AtomicU32>,
    handle: Option<JoinHandle<()>>,
}

impl RealtimeScheduler {
    /// Spawn the tick thread
    ///
    /// `handler` receives the elapsed seconds since start on every tick.
    pub fn start<F>(name: impl Into<String>, interval: Duration, handler: F) -> Result<Self>
    where
        F: FnMut(f64) + Send + 'static,
    {
        if interval.is_zero() {
            return Err(AppError::Render("scheduler interval must be non-zero".to_string()));
        }

        let name = name.into();
        let running = Arc::new(AtomicBool::new(true));
        let ticks_per_second = Arc::new(AtomicU32::new(0));

        let handle = {
            let name = name.clone();
            let running = running.clone();
            let ticks_per_second = ticks_per_second.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || tick_loop(&name, interval, &running, &ticks_per_second, handler))?
        };

        debug!("Scheduler '{}' started ({:?} interval)", name, interval);

        Ok(Self {
            name,
            interval,
            running,
            ticks_per_second,
            handle: Some(handle),
        })
    }

    /// Spawn a scheduler ticking `rate` times per second
    pub fn with_rate<F>(name: impl Into<String>, rate: u32, handler: F) -> Result<Self>
    where
        F: FnMut(f64) + Send + 'static,
    {
        if rate == 0 {
            return Err(AppError::Render("scheduler rate must be non-zero".to_string()));
        }
        Self::start(name, Duration::from_secs(1) / rate, handler)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks counted over the last full second
    pub fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop ticking and join the thread
    ///
    /// Blocks for at most one interval plus any tick already in progress.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Scheduler '{}' tick handler panicked", self.name);
            }
            debug!("Scheduler '{}' stopped", self.name);
        }
    }
}

impl Drop for RealtimeScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick_loop<F>(
    name: &str,
    interval: Duration,
    running: &AtomicBool,
    ticks_per_second: &AtomicU32,
    mut handler: F,
) where
    F: FnMut(f64),
{
    let start = Instant::now();
    let mut iteration: u64 = 0;
    let mut window_start = start;
    let mut window_ticks: u32 = 0;

    while running.load(Ordering::Acquire) {
        iteration += 1;
        let wake = deadline(start, interval, iteration);
        let now = Instant::now();
        if wake > now {
            thread::sleep(wake - now);
        }

        if !running.load(Ordering::Acquire) {
            break;
        }

        handler(start.elapsed().as_secs_f64());

        window_ticks += 1;
        let now = Instant::now();
        if now.duration_since(window_start) >= Duration::from_secs(1) {
            ticks_per_second.store(window_ticks, Ordering::Relaxed);
            trace!("Scheduler '{}': {} ticks/s", name, window_ticks);
            window_ticks = 0;
            window_start = now;
        }
    }
}
