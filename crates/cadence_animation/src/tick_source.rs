//! Tick sources
//!
//! A tick source turns one host timing primitive into a stream of ticks:
//! - [`IntervalTickSource`] - a repeating timer on a [`TimerHost`]
//! - [`PaintTickSource`] - one tick before each repaint of a
//!   [`TimingEnvironment`], or a timer when the environment cannot notify
//!
//! [`TickSourceKind::select`] picks between them from whether an environment
//! is bound.

use cadence_platform::{PaintRequestId, Result, TimerHost, TimerId, TimingEnvironment};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Invoked on every tick
pub type TickHandler = Rc<dyn Fn() -> Result<()>>;

/// Uniform start/stop interface over host timing primitives
pub trait TickSource {
    /// Begin ticking. No-op when already active.
    fn start(&mut self) -> Result<()>;

    /// Stop ticking. No-op when already stopped.
    fn stop(&mut self) -> Result<()>;

    fn is_active(&self) -> bool;

    fn kind(&self) -> TickSourceKind;
}

/// The two interchangeable tick strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickSourceKind {
    /// Fixed-period repeating timer
    Interval,
    /// Once before each repaint of the bound environment
    PaintSynchronized,
}

impl TickSourceKind {
    /// Pick the strategy for an optional environment
    pub fn select(environment: Option<&Rc<dyn TimingEnvironment>>) -> Self {
        match environment {
            Some(_) => TickSourceKind::PaintSynchronized,
            None => TickSourceKind::Interval,
        }
    }
}

/// Build the tick source matching `environment`
pub fn create_tick_source(
    environment: Option<&Rc<dyn TimingEnvironment>>,
    timers: &Rc<dyn TimerHost>,
    period: Duration,
    handler: TickHandler,
) -> Box<dyn TickSource> {
    match (TickSourceKind::select(environment), environment) {
        (TickSourceKind::PaintSynchronized, Some(env)) => Box::new(PaintTickSource::new(
            Rc::clone(env),
            Rc::clone(timers),
            period,
            handler,
        )),
        _ => Box::new(IntervalTickSource::new(Rc::clone(timers), period, handler)),
    }
}

// ============================================================================
// Interval
// ============================================================================

/// Ticks at a fixed period regardless of the host's repaint cycle
pub struct IntervalTickSource {
    timers: Rc<dyn TimerHost>,
    period: Duration,
    handler: TickHandler,
    timer: Option<TimerId>,
}

impl IntervalTickSource {
    pub fn new(timers: Rc<dyn TimerHost>, period: Duration, handler: TickHandler) -> Self {
        Self {
            timers,
            period,
            handler,
            timer: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl TickSource for IntervalTickSource {
    fn start(&mut self) -> Result<()> {
        if self.timer.is_some() {
            return Ok(());
        }

        let handler = Rc::clone(&self.handler);
        let id = self
            .timers
            .set_interval(self.period, Box::new(move || handler()))?;
        self.timer = Some(id);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(id) = self.timer {
            self.timers.clear_interval(id)?;
            self.timer = None;
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.timer.is_some()
    }

    fn kind(&self) -> TickSourceKind {
        TickSourceKind::Interval
    }
}

impl Drop for IntervalTickSource {
    fn drop(&mut self) {
        if let Some(id) = self.timer.take() {
            let _ = self.timers.clear_interval(id);
        }
    }
}

// ============================================================================
// Paint-synchronized
// ============================================================================

#[derive(Default)]
struct PaintState {
    active: bool,
    request: Option<PaintRequestId>,
}

/// Ticks once right before each repaint of a timing environment
///
/// Environments without before-paint support get an internal
/// [`IntervalTickSource`] instead; the source still reports itself as
/// [`TickSourceKind::PaintSynchronized`].
pub struct PaintTickSource {
    environment: Rc<dyn TimingEnvironment>,
    handler: TickHandler,
    state: Rc<RefCell<PaintState>>,
    fallback: Option<IntervalTickSource>,
}

impl PaintTickSource {
    pub fn new(
        environment: Rc<dyn TimingEnvironment>,
        timers: Rc<dyn TimerHost>,
        period: Duration,
        handler: TickHandler,
    ) -> Self {
        let fallback = if environment.supports_paint_callbacks() {
            None
        } else {
            tracing::debug!("PaintTickSource: environment has no paint callbacks, using timer");
            Some(IntervalTickSource::new(timers, period, Rc::clone(&handler)))
        };

        Self {
            environment,
            handler,
            state: Rc::new(RefCell::new(PaintState::default())),
            fallback,
        }
    }

    /// Whether ticks come from the fallback timer
    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }

    /// Ask the environment for the next before-paint callback
    ///
    /// The next frame is requested before the handler runs so a failing
    /// handler does not stall the source; a handler that stops the source
    /// cancels that request.
    fn request_frame(
        state: &Rc<RefCell<PaintState>>,
        environment: &Rc<dyn TimingEnvironment>,
        handler: &TickHandler,
    ) -> Result<()> {
        let weak_state = Rc::downgrade(state);
        let env = Rc::clone(environment);
        let handler = Rc::clone(handler);

        let id = environment.request_paint_callback(Box::new(move |_frame_ms| {
            let Some(state) = weak_state.upgrade() else {
                return Ok(());
            };
            let active = {
                let mut s = state.borrow_mut();
                s.request = None;
                s.active
            };
            if !active {
                return Ok(());
            }

            PaintTickSource::request_frame(&state, &env, &handler)?;
            handler()
        }))?;

        state.borrow_mut().request = Some(id);
        Ok(())
    }
}

impl TickSource for PaintTickSource {
    fn start(&mut self) -> Result<()> {
        if let Some(fallback) = self.fallback.as_mut() {
            return fallback.start();
        }
        if self.state.borrow().active {
            return Ok(());
        }

        Self::request_frame(&self.state, &self.environment, &self.handler)?;
        self.state.borrow_mut().active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(fallback) = self.fallback.as_mut() {
            return fallback.stop();
        }

        let request = {
            let mut state = self.state.borrow_mut();
            state.active = false;
            state.request.take()
        };
        if let Some(id) = request {
            self.environment.cancel_paint_callback(id)?;
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        match self.fallback.as_ref() {
            Some(fallback) => fallback.is_active(),
            None => self.state.borrow().active,
        }
    }

    fn kind(&self) -> TickSourceKind {
        TickSourceKind::PaintSynchronized
    }
}

impl Drop for PaintTickSource {
    fn drop(&mut self) {
        let request = {
            let mut state = self.state.borrow_mut();
            state.active = false;
            state.request.take()
        };
        if let Some(id) = request {
            let _ = self.environment.cancel_paint_callback(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_platform::{FrameWindow, MockClock, TimerQueue, TimingError};
    use std::cell::Cell;

    fn counting_handler() -> (Rc<Cell<u32>>, TickHandler) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let handler: TickHandler = Rc::new(move || {
            c.set(c.get() + 1);
            Ok(())
        });
        (count, handler)
    }

    #[test]
    fn test_select_is_driven_by_environment_presence() {
        let window: Rc<dyn TimingEnvironment> = Rc::new(FrameWindow::new(MockClock::new()));
        assert_eq!(TickSourceKind::select(None), TickSourceKind::Interval);
        assert_eq!(
            TickSourceKind::select(Some(&window)),
            TickSourceKind::PaintSynchronized
        );
    }

    #[test]
    fn test_interval_source_start_stop_idempotent() {
        let queue = TimerQueue::manual(MockClock::new());
        let timers: Rc<dyn TimerHost> = Rc::new(queue.clone());
        let (count, handler) = counting_handler();
        let mut source = IntervalTickSource::new(timers, Duration::from_millis(20), handler);

        source.start().unwrap();
        source.start().unwrap();
        assert!(source.is_active());
        assert_eq!(queue.len(), 1);

        queue.advance(Duration::from_millis(40)).unwrap();
        assert_eq!(count.get(), 2);

        source.stop().unwrap();
        source.stop().unwrap();
        assert!(!source.is_active());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_paint_source_ticks_once_per_paint() {
        let window = FrameWindow::new(MockClock::new());
        let env: Rc<dyn TimingEnvironment> = Rc::new(window.clone());
        let timers: Rc<dyn TimerHost> = Rc::new(TimerQueue::manual(MockClock::new()));
        let (count, handler) = counting_handler();
        let mut source = PaintTickSource::new(env, timers, Duration::from_millis(20), handler);

        source.start().unwrap();
        source.start().unwrap();
        assert_eq!(window.pending_count(), 1);

        window.paint().unwrap();
        window.paint().unwrap();
        assert_eq!(count.get(), 2);
        assert_eq!(window.pending_count(), 1);

        source.stop().unwrap();
        assert!(!source.is_active());
        assert_eq!(window.pending_count(), 0);

        window.paint().unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_paint_source_stops_cleanly_after_failed_paint() {
        let window = FrameWindow::new(MockClock::new());
        let env: Rc<dyn TimingEnvironment> = Rc::new(window.clone());
        let timers: Rc<dyn TimerHost> = Rc::new(TimerQueue::manual(MockClock::new()));
        let blocker_ran = Rc::new(Cell::new(false));

        // Queued ahead of the source so it fails first
        let flag = Rc::clone(&blocker_ran);
        window
            .request_paint_callback(Box::new(move |_| {
                flag.set(true);
                Err(TimingError::Host("compositor lost".to_string()))
            }))
            .unwrap();

        let (count, handler) = counting_handler();
        let mut source = PaintTickSource::new(env, timers, Duration::from_millis(20), handler);
        source.start().unwrap();

        assert!(window.paint().is_err());
        assert!(blocker_ran.get());
        assert_eq!(count.get(), 0);
        assert_eq!(window.pending_count(), 1);

        source.stop().unwrap();
        assert_eq!(window.pending_count(), 0);
        window.paint().unwrap();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_paint_source_falls_back_to_timer() {
        let window = FrameWindow::without_paint_callbacks(MockClock::new());
        let env: Rc<dyn TimingEnvironment> = Rc::new(window.clone());
        let queue = TimerQueue::manual(MockClock::new());
        let timers: Rc<dyn TimerHost> = Rc::new(queue.clone());
        let (count, handler) = counting_handler();
        let mut source = PaintTickSource::new(env, timers, Duration::from_millis(20), handler);

        assert!(source.is_degraded());
        assert_eq!(source.kind(), TickSourceKind::PaintSynchronized);

        source.start().unwrap();
        assert!(source.is_active());
        assert_eq!(queue.len(), 1);

        queue.advance(Duration::from_millis(20)).unwrap();
        assert_eq!(count.get(), 1);

        source.stop().unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dropping_source_releases_host_resources() {
        let queue = TimerQueue::manual(MockClock::new());
        let timers: Rc<dyn TimerHost> = Rc::new(queue.clone());
        let window = FrameWindow::new(MockClock::new());
        let env: Rc<dyn TimingEnvironment> = Rc::new(window.clone());

        let (_, handler) = counting_handler();
        let period = Duration::from_millis(20);
        let mut interval = create_tick_source(None, &timers, period, Rc::clone(&handler));
        let mut paint = create_tick_source(Some(&env), &timers, period, handler);
        interval.start().unwrap();
        paint.start().unwrap();
        assert_eq!(interval.kind(), TickSourceKind::Interval);
        assert_eq!(paint.kind(), TickSourceKind::PaintSynchronized);

        drop(interval);
        drop(paint);
        assert!(queue.is_empty());
        assert_eq!(window.pending_count(), 0);
    }
}
