//! Injectable time source.
//!
//! Every periodic loop and freshness check takes a [`Clock`] instead of
//! reading `Instant::now()` directly, so tests drive time with a
//! [`ManualClock`] rather than sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Milliseconds since an arbitrary per-process epoch.
pub type Ticks = u64;

pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now(&self) -> Ticks;

    /// Block the calling task for the given duration.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock backed implementation used in production.
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Ticks {
        self.epoch.elapsed().as_millis() as Ticks
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Deterministic clock for tests; `sleep` advances virtual time instead of
/// blocking.
#[derive(Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: Ticks) -> Self {
        let clock = Self::new();
        clock.now_ms.store(ms, Ordering::SeqCst);
        clock
    }

    pub fn advance(&self, ms: Ticks) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Ticks {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration.as_millis() as Ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0);
        clock.advance(250);
        assert_eq!(clock.now(), 250);
        clock.sleep(Duration::from_millis(50));
        assert_eq!(clock.now(), 300);
    }

    #[test]
    fn test_manual_clock_shares_state_across_clones() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(10);
        assert_eq!(other.now(), 10);
    }
}
