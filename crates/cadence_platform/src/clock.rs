//! Clocks
//!
//! Every timestamp handed to animations is a millisecond value read from a
//! [`Clock`]. [`SystemClock`] follows the wall of real time; [`MockClock`]
//! only moves when told to, which makes tick-driven code deterministic.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A monotonic millisecond clock
pub trait Clock {
    /// Milliseconds elapsed since the clock's origin
    fn now_ms(&self) -> f64;
}

/// Real monotonic time, measured from the clock's creation
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a new clock starting now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_micros() as f64 / 1000.0
    }
}

/// A manually advanced clock
///
/// Clones share the same time, so a clock handed to a timer queue and a
/// window can be advanced from a single place.
///
/// ```ignore
/// let clock = MockClock::new();
/// clock.advance(Duration::from_millis(20));
/// assert_eq!(clock.now_ms(), 20.0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockClock {
    now: Rc<Cell<f64>>,
}

impl MockClock {
    /// Create a clock reading zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock reading `start_ms`
    pub fn starting_at(start_ms: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by.as_micros() as f64 / 1000.0);
    }

    /// Jump to an absolute time
    ///
    /// Requests to move backwards are ignored; the clock never runs in reverse.
    pub fn set_ms(&self, now_ms: f64) {
        if now_ms > self.now.get() {
            self.now.set(now_ms);
        }
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_shared_between_clones() {
        let clock = MockClock::new();
        let other = clock.clone();

        clock.advance(Duration::from_millis(20));
        assert_eq!(other.now_ms(), 20.0);
    }

    #[test]
    fn test_mock_clock_never_goes_backwards() {
        let clock = MockClock::starting_at(100.0);
        clock.set_ms(50.0);
        assert_eq!(clock.now_ms(), 100.0);

        clock.set_ms(150.0);
        assert_eq!(clock.now_ms(), 150.0);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
