//! Per-thread shared registry
//!
//! Most code never builds an [`AnimationRegistry`] itself: animations call
//! [`register_animation`] and [`unregister_animation`], and every call on the
//! same thread lands in the same registry so all animations share one tick.
//!
//! The registry is created on first use over a real-time [`TimerQueue`] that
//! the event loop pumps via [`default_timer_queue`]. Hosts (and tests) that
//! want another timer host install their own with [`install_registry`].

use crate::frame::{AnimationFrame, AnimationId};
use crate::registry::AnimationRegistry;
use cadence_platform::{Result, TimerQueue, TimingEnvironment};
use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static REGISTRY: RefCell<Option<AnimationRegistry>> = const { RefCell::new(None) };
    static DEFAULT_TIMERS: TimerQueue = TimerQueue::system();
}

/// Install the registry used by the free functions on this thread
///
/// Returns the previously installed registry, which is left untouched.
pub fn install_registry(registry: AnimationRegistry) -> Option<AnimationRegistry> {
    REGISTRY.with(|r| r.borrow_mut().replace(registry))
}

/// Remove the registry installed on this thread
pub fn uninstall_registry() -> Option<AnimationRegistry> {
    REGISTRY.with(|r| r.borrow_mut().take())
}

/// Get the registry installed on this thread, if any
pub fn try_registry() -> Option<AnimationRegistry> {
    REGISTRY.with(|r| r.borrow().clone())
}

/// Check if a registry is installed on this thread
pub fn is_registry_installed() -> bool {
    REGISTRY.with(|r| r.borrow().is_some())
}

/// Get this thread's registry, creating the default one on first use
pub fn registry() -> AnimationRegistry {
    REGISTRY.with(|r| {
        r.borrow_mut()
            .get_or_insert_with(|| {
                tracing::debug!("Creating default animation registry");
                AnimationRegistry::new(Rc::new(default_timer_queue()))
            })
            .clone()
    })
}

/// The real-time timer queue behind the default registry
///
/// The event loop must pump it (for example with [`TimerQueue::run_for`])
/// for interval ticks to happen.
pub fn default_timer_queue() -> TimerQueue {
    DEFAULT_TIMERS.with(TimerQueue::clone)
}

/// Register an animation with this thread's registry
pub fn register_animation<A: AnimationFrame + 'static>(animation: &Rc<A>) -> Result<AnimationId> {
    registry().register(animation)
}

/// Unregister an animation from this thread's registry
pub fn unregister_animation<A: AnimationFrame + 'static>(animation: &Rc<A>) -> Result<bool> {
    registry().unregister(animation)
}

/// Bind the environment used for paint-synchronized ticking
///
/// `None` returns to interval ticking.
pub fn set_animation_window(environment: Option<Rc<dyn TimingEnvironment>>) -> Result<()> {
    registry().set_timing_environment(environment)
}

/// Whether `environment` is the one currently bound
pub fn is_animation_window(environment: &Rc<dyn TimingEnvironment>) -> bool {
    try_registry().is_some_and(|r| r.is_timing_environment(environment))
}

/// Reset this thread's animation state
///
/// Stops the shared tick source and forgets every animation and the bound
/// environment. The installed registry stays installed.
pub fn tear_down() -> Result<()> {
    match try_registry() {
        Some(registry) => registry.reset(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TICK_INTERVAL;
    use cadence_platform::{FrameWindow, MockClock};
    use std::cell::Cell;

    struct Counter {
        calls: Cell<u32>,
    }

    impl AnimationFrame for Counter {
        fn on_animation_frame(&self, _now_ms: f64) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    fn install_manual() -> TimerQueue {
        let timers = TimerQueue::manual(MockClock::new());
        install_registry(AnimationRegistry::new(Rc::new(timers.clone())));
        timers
    }

    #[test]
    fn test_free_functions_share_installed_registry() {
        let timers = install_manual();
        let anim = Rc::new(Counter { calls: Cell::new(0) });

        register_animation(&anim).unwrap();
        assert!(registry().is_ticking());

        timers.advance(TICK_INTERVAL).unwrap();
        assert_eq!(anim.calls.get(), 1);

        assert!(unregister_animation(&anim).unwrap());
        timers.advance(TICK_INTERVAL).unwrap();
        assert_eq!(anim.calls.get(), 1);
        assert!(!registry().is_ticking());

        tear_down().unwrap();
        uninstall_registry();
    }

    #[test]
    fn test_animation_window_binding() {
        let _timers = install_manual();
        let window: Rc<dyn TimingEnvironment> = Rc::new(FrameWindow::new(MockClock::new()));
        let other: Rc<dyn TimingEnvironment> = Rc::new(FrameWindow::new(MockClock::new()));

        assert!(!is_animation_window(&window));
        set_animation_window(Some(Rc::clone(&window))).unwrap();
        assert!(is_animation_window(&window));
        assert!(!is_animation_window(&other));

        tear_down().unwrap();
        assert!(!is_animation_window(&window));
        uninstall_registry();
    }

    #[test]
    fn test_default_registry_created_lazily() {
        uninstall_registry();
        assert!(!is_registry_installed());

        let first = registry();
        assert!(is_registry_installed());
        assert!(first.is_empty());
        assert!(try_registry().is_some());

        tear_down().unwrap();
        uninstall_registry();
    }

    #[test]
    fn test_tear_down_without_registry_is_noop() {
        uninstall_registry();
        tear_down().unwrap();
        assert!(!is_registry_installed());
    }
}
