//! Monotonic time sources
//!
//! The transport and capture deadlines read time through [`Clock`] so the
//! whole editor can run against a [`ManualClock`] in tests and in headless
//! renders.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A monotonic time source in seconds since an arbitrary origin
pub trait Clock: Send + Sync {
    /// Current time in seconds. Never decreases.
    fn now(&self) -> f64;
}

/// Wall-clock backed monotonic time
#[derive(Debug, Clone)]
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
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock
///
/// Clones share the same time, so a test can keep one handle while the
/// editor owns another.
///
/// # Example
/// ```
/// use samplecraft::engine::clock::{Clock, ManualClock};
/// let clock = ManualClock::new();
/// let handle = clock.clone();
/// handle.advance(0.5);
/// assert_eq!(clock.now(), 0.5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward; negative steps are ignored
    pub fn advance(&self, secs: f64) {
        if secs > 0.0 {
            self.set(self.now() + secs);
        }
    }

    /// Jump to an absolute time, never backwards
    pub fn set(&self, secs: f64) {
        let current = self.now();
        if secs > current {
            self.bits.store(secs.to_bits(), Ordering::SeqCst);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_starts_at_zero() {
        assert_eq!(ManualClock::new().now(), 0.0);
    }

    #[test]
    fn test_manual_clock_never_goes_back() {
        let clock = ManualClock::new();
        clock.advance(2.0);
        clock.set(1.0);
        clock.advance(-1.0);
        assert_eq!(clock.now(), 2.0);
    }

    #[test]
    fn test_monotonic_clock_increases() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
