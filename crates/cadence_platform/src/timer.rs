//! Repeating timers
//!
//! [`TimerHost`] is the "repeat every N ms" primitive a host offers.
//! [`TimerQueue`] is a single-threaded implementation of it: nothing fires on
//! its own, the event loop pumps the queue with [`TimerQueue::run_for`] (real
//! time) or [`TimerQueue::advance`] (simulated time on a [`MockClock`]).
//!
//! Callbacks run with no borrow of the queue held, so they may install or
//! clear timers, including their own.

use crate::clock::{Clock, MockClock, SystemClock};
use crate::error::{Result, TimingError};
use slotmap::{new_key_type, SlotMap};
use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

new_key_type! {
    /// Handle to an installed repeating timer
    pub struct TimerId;
}

/// Callback invoked each time a timer fires
pub type TimerCallback = Box<dyn FnMut() -> Result<()>>;

/// Host primitive for repeating timers
pub trait TimerHost {
    /// Current time of the clock driving the timers
    fn now_ms(&self) -> f64;

    /// Install a timer firing every `period`, first after one period
    fn set_interval(&self, period: Duration, callback: TimerCallback) -> Result<TimerId>;

    /// Remove a timer
    ///
    /// Clearing an unknown or already cleared timer is a no-op.
    fn clear_interval(&self, id: TimerId) -> Result<()>;
}

struct TimerEntry {
    period_ms: f64,
    next_fire_ms: f64,
    seq: u64,
    callback: Rc<RefCell<TimerCallback>>,
}

#[derive(Default)]
struct TimerQueueInner {
    timers: SlotMap<TimerId, TimerEntry>,
    next_seq: u64,
    fired: u64,
}

impl TimerQueueInner {
    /// Earliest timer due at or before `now_ms`, ties broken by install order
    fn next_due(&self, now_ms: f64) -> Option<TimerId> {
        self.timers
            .iter()
            .filter(|(_, t)| t.next_fire_ms <= now_ms)
            .min_by(|(_, a), (_, b)| {
                a.next_fire_ms
                    .total_cmp(&b.next_fire_ms)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|(id, _)| id)
    }

    fn next_deadline(&self) -> Option<f64> {
        self.timers
            .values()
            .map(|t| t.next_fire_ms)
            .min_by(f64::total_cmp)
    }
}

/// A cooperative, single-threaded timer queue
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct TimerQueue {
    inner: Rc<RefCell<TimerQueueInner>>,
    clock: Rc<dyn Clock>,
    manual: Option<MockClock>,
}

impl TimerQueue {
    /// A queue driven by real monotonic time
    pub fn system() -> Self {
        Self {
            inner: Rc::new(RefCell::new(TimerQueueInner::default())),
            clock: Rc::new(SystemClock::new()),
            manual: None,
        }
    }

    /// A queue driven by a manually advanced clock
    pub fn manual(clock: MockClock) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TimerQueueInner::default())),
            clock: Rc::new(clock.clone()),
            manual: Some(clock),
        }
    }

    /// The mock clock behind a manual queue
    pub fn mock_clock(&self) -> Option<&MockClock> {
        self.manual.as_ref()
    }

    /// Number of installed timers
    pub fn len(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().timers.is_empty()
    }

    /// Whether a timer is still installed
    pub fn contains(&self, id: TimerId) -> bool {
        self.inner.borrow().timers.contains_key(id)
    }

    /// Total number of timer firings since the queue was created
    pub fn fired_count(&self) -> u64 {
        self.inner.borrow().fired
    }

    /// Deadline of the next timer to fire
    pub fn next_deadline_ms(&self) -> Option<f64> {
        self.inner.borrow().next_deadline()
    }

    /// Fire every timer that is due at the current clock reading
    ///
    /// A timer that fell more than one period behind fires once and is
    /// rescheduled relative to now rather than bursting to catch up.
    /// Returns the number of firings. The first callback error stops the pump
    /// and is returned.
    pub fn fire_due(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let mut fired = 0;

        loop {
            let cell = {
                let mut inner = self.inner.borrow_mut();
                let Some(id) = inner.next_due(now) else {
                    break;
                };
                inner.fired += 1;
                let timer = &mut inner.timers[id];
                timer.next_fire_ms += timer.period_ms;
                if timer.next_fire_ms <= now {
                    timer.next_fire_ms = now + timer.period_ms;
                }
                Rc::clone(&timer.callback)
            };

            let mut callback = cell
                .try_borrow_mut()
                .map_err(|_| TimingError::Host("timer callback re-entered".to_string()))?;
            (*callback)()?;
            fired += 1;
        }

        Ok(fired)
    }

    /// Advance the mock clock, firing timers at their exact deadlines
    ///
    /// Only available on queues created with [`TimerQueue::manual`].
    pub fn advance(&self, by: Duration) -> Result<usize> {
        let Some(clock) = self.manual.as_ref() else {
            return Err(TimingError::TimerUnavailable(
                "advance() requires a manual clock".to_string(),
            ));
        };

        let target = clock.now_ms() + by.as_micros() as f64 / 1000.0;
        let mut fired = 0;

        while let Some(deadline) = self.next_deadline_ms() {
            if deadline > target {
                break;
            }
            clock.set_ms(deadline);
            fired += self.fire_due()?;
        }
        clock.set_ms(target);

        Ok(fired)
    }

    /// Pump the queue for `duration`
    ///
    /// Sleeps the current thread between deadlines. On a manual queue this is
    /// the same as [`TimerQueue::advance`].
    pub fn run_for(&self, duration: Duration) -> Result<usize> {
        if self.manual.is_some() {
            return self.advance(duration);
        }

        let end = Instant::now() + duration;
        let mut fired = 0;

        loop {
            fired += self.fire_due()?;

            let now = Instant::now();
            if now >= end {
                break;
            }

            let until_end = end - now;
            let wait = match self.next_deadline_ms() {
                Some(deadline) => {
                    let delta_ms = (deadline - self.clock.now_ms()).max(0.0);
                    Duration::from_secs_f64(delta_ms / 1000.0).min(until_end)
                }
                None => until_end,
            };
            thread::sleep(wait);
        }

        Ok(fired)
    }
}

impl TimerHost for TimerQueue {
    fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    fn set_interval(&self, period: Duration, callback: TimerCallback) -> Result<TimerId> {
        let period_ms = period.as_micros() as f64 / 1000.0;
        if period_ms <= 0.0 {
            return Err(TimingError::TimerUnavailable(
                "interval period must be at least 1us".to_string(),
            ));
        }

        let now = self.clock.now_ms();
        let mut inner = self.inner.borrow_mut();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let id = inner.timers.insert(TimerEntry {
            period_ms,
            next_fire_ms: now + period_ms,
            seq,
            callback: Rc::new(RefCell::new(callback)),
        });

        tracing::trace!("TimerQueue: installed interval {:?} every {}ms", id, period_ms);
        Ok(id)
    }

    fn clear_interval(&self, id: TimerId) -> Result<()> {
        if self.inner.borrow_mut().timers.remove(id).is_some() {
            tracing::trace!("TimerQueue: cleared interval {:?}", id);
        }
        Ok(())
    }
}
