//! Time sources for the acquisition loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time plus the ability to block until later.
///
/// `now()` is measured from an arbitrary, fixed origin and never decreases.
pub trait Clock {
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Wall clock backed by [`Instant`] and a blocking thread sleep.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual clock: sleeping advances time instantly.
///
/// Clones share the same time, so a simulated sensor holding a clone can
/// charge its read latency to the clock the scheduler is using.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: Duration) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(start.as_nanos() as u64)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::starting_at(Duration::from_secs(5));
        let handle = clock.clone();
        handle.advance(Duration::from_millis(3));
        clock.sleep(Duration::from_millis(7));
        assert_eq!(handle.now(), Duration::from_millis(5010));
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        clock.sleep(Duration::from_millis(1));
        let b = clock.now();
        assert!(b >= a + Duration::from_millis(1));
    }
}
