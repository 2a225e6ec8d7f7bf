//! Animation registry
//!
//! Keeps every registered animation and the one tick source that drives them.
//! The source is created on the first registration, stopped and released when
//! the last animation leaves, and rebuilt when the timing environment changes.
//! After every call, the source is active exactly when the registry is
//! non-empty.
//!
//! Each tick samples "now" once from the timer host's clock and dispatches it
//! to a snapshot of the registered animations taken at the start of the tick,
//! in ascending [`AnimationId`] order. Tick timestamps never decrease, even
//! across environment switches. Callbacks may register, unregister and reset
//! freely:
//! - an animation unregistered earlier in the tick is skipped
//! - an animation registered during the tick waits for the next one
//! - nothing is dispatched twice

use crate::config::SchedulerConfig;
use crate::frame::{identity_of, AnimationFrame, AnimationId};
use crate::tick_source::{create_tick_source, TickHandler, TickSource, TickSourceKind};
use cadence_platform::{same_environment, Result, TimerHost, TimingEnvironment};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

struct Entry {
    identity: usize,
    animation: Weak<dyn AnimationFrame>,
}

/// Internal state of the registry
struct RegistryInner {
    entries: BTreeMap<AnimationId, Entry>,
    by_identity: FxHashMap<usize, AnimationId>,
    next_id: u64,
    source: Option<Box<dyn TickSource>>,
    environment: Option<Rc<dyn TimingEnvironment>>,
    timers: Rc<dyn TimerHost>,
    config: SchedulerConfig,
    ticks: u64,
    last_now_ms: f64,
}

impl RegistryInner {
    /// Environment that selects the tick source, if paint sync is enabled
    fn selecting_environment(&self) -> Option<&Rc<dyn TimingEnvironment>> {
        self.environment
            .as_ref()
            .filter(|_| self.config.prefer_paint_sync)
    }

    /// Current time, never earlier than the last dispatched tick
    fn now_ms(&self) -> f64 {
        self.timers.now_ms().max(self.last_now_ms)
    }

    /// Whether `id` still names the entry a snapshot captured
    fn holds(&self, id: AnimationId, animation: &Weak<dyn AnimationFrame>) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|entry| Weak::ptr_eq(&entry.animation, animation))
    }

    fn is_ticking(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.is_active())
    }

    fn remove(&mut self, id: AnimationId) -> Option<Entry> {
        let entry = self.entries.remove(&id)?;
        self.by_identity.remove(&entry.identity);
        Some(entry)
    }

    /// Stop and drop the tick source
    ///
    /// A failing stop leaves the source in place so the registry keeps
    /// reporting what the host is actually doing.
    fn release_source(&mut self) -> Result<()> {
        if let Some(source) = self.source.as_mut() {
            source.stop()?;
            tracing::debug!("AnimationRegistry: tick source stopped ({:?})", source.kind());
        }
        self.source = None;
        Ok(())
    }
}

/// The shared animation registry
///
/// A cheap-clone handle; clones refer to the same registry. The registry is
/// single-threaded and meant to live on the thread running the event loop.
///
/// # Example
///
/// ```ignore
/// use cadence_animation::{AnimationRegistry, TICK_INTERVAL};
/// use cadence_platform::{MockClock, TimerQueue};
/// use std::rc::Rc;
///
/// let timers = TimerQueue::manual(MockClock::new());
/// let registry = AnimationRegistry::new(Rc::new(timers.clone()));
///
/// registry.register(&my_animation)?;   // starts the shared timer
/// timers.advance(TICK_INTERVAL)?;      // one tick, one callback
/// registry.unregister(&my_animation)?; // registry empty, timer stopped
/// ```
#[derive(Clone)]
pub struct AnimationRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl AnimationRegistry {
    /// Create a registry ticking on `timers` with the standard configuration
    pub fn new(timers: Rc<dyn TimerHost>) -> Self {
        Self::build(timers, SchedulerConfig::standard())
    }

    /// Create a registry with a custom configuration
    pub fn with_config(timers: Rc<dyn TimerHost>, config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(timers, config))
    }

    fn build(timers: Rc<dyn TimerHost>, config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                entries: BTreeMap::new(),
                by_identity: FxHashMap::default(),
                next_id: 0,
                source: None,
                environment: None,
                timers,
                config,
                ticks: 0,
                last_now_ms: f64::NEG_INFINITY,
            })),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register an animation
    ///
    /// Registering a member again returns its existing id and leaves the tick
    /// source running as it is. Safe to call from inside a tick callback.
    pub fn register<A: AnimationFrame + 'static>(&self, animation: &Rc<A>) -> Result<AnimationId> {
        let animation: Rc<dyn AnimationFrame> = Rc::clone(animation) as Rc<dyn AnimationFrame>;
        self.register_dyn(&animation)
    }

    /// Register a type-erased animation
    pub fn register_dyn(&self, animation: &Rc<dyn AnimationFrame>) -> Result<AnimationId> {
        let identity = identity_of(animation);
        let mut inner = self.inner.borrow_mut();

        let (id, inserted) = match inner.by_identity.get(&identity).copied() {
            Some(id) => (id, false),
            None => {
                let id = AnimationId(inner.next_id);
                inner.next_id += 1;
                inner.entries.insert(
                    id,
                    Entry {
                        identity,
                        animation: Rc::downgrade(animation),
                    },
                );
                inner.by_identity.insert(identity, id);
                (id, true)
            }
        };

        if let Err(err) = self.ensure_ticking(&mut inner) {
            // Undo the insert so the registry stays empty iff nothing ticks
            if inserted {
                inner.remove(id);
                if inner.entries.is_empty() {
                    inner.source = None;
                }
            }
            tracing::warn!("AnimationRegistry: failed to start tick source: {}", err);
            return Err(err);
        }

        if inserted {
            tracing::trace!("AnimationRegistry: registered {}", id);
        }
        Ok(id)
    }

    /// Unregister an animation
    ///
    /// Returns whether it was registered. Stops and releases the tick source
    /// when the registry becomes empty. Safe to call from inside a tick
    /// callback, for the animation being dispatched or any other.
    pub fn unregister<A: AnimationFrame + 'static>(&self, animation: &Rc<A>) -> Result<bool> {
        let animation: Rc<dyn AnimationFrame> = Rc::clone(animation) as Rc<dyn AnimationFrame>;
        self.unregister_dyn(&animation)
    }

    /// Unregister a type-erased animation
    pub fn unregister_dyn(&self, animation: &Rc<dyn AnimationFrame>) -> Result<bool> {
        let id = self.inner.borrow().by_identity.get(&identity_of(animation)).copied();
        match id {
            Some(id) => self.unregister_id(id),
            None => Ok(false),
        }
    }

    /// Unregister by registration id
    pub fn unregister_id(&self, id: AnimationId) -> Result<bool> {
        let mut inner = self.inner.borrow_mut();
        if inner.remove(id).is_none() {
            return Ok(false);
        }
        tracing::trace!("AnimationRegistry: unregistered {}", id);

        if inner.entries.is_empty() {
            inner.release_source()?;
        }
        Ok(true)
    }

    /// Create and start the tick source if it is not already running
    fn ensure_ticking(&self, inner: &mut RegistryInner) -> Result<()> {
        if inner.source.is_none() {
            let weak = Rc::downgrade(&self.inner);
            let handler: TickHandler = Rc::new(move || match weak.upgrade() {
                Some(inner) => AnimationRegistry { inner }.cycle_animations().map(|_| ()),
                None => Ok(()),
            });
            let source = create_tick_source(
                inner.selecting_environment(),
                &inner.timers,
                inner.config.interval(),
                handler,
            );
            inner.source = Some(source);
        }

        if let Some(source) = inner.source.as_mut() {
            if !source.is_active() {
                source.start()?;
                tracing::debug!("AnimationRegistry: tick source started ({:?})", source.kind());
            }
        }
        Ok(())
    }

    // =========================================================================
    // Tick fan-out
    // =========================================================================

    /// Dispatch one tick to every registered animation
    ///
    /// Called by the active tick source; hosts driving ticks by hand may call
    /// it directly. Returns the number of animations dispatched. Animations
    /// whose owner dropped them are pruned like an unregister. The first
    /// callback error ends the tick and is returned.
    pub fn cycle_animations(&self) -> Result<usize> {
        let (now, snapshot): (f64, Vec<(AnimationId, Weak<dyn AnimationFrame>)>) = {
            let mut inner = self.inner.borrow_mut();
            let now = inner.now_ms();
            inner.last_now_ms = now;
            let snapshot = inner
                .entries
                .iter()
                .map(|(id, entry)| (*id, Weak::clone(&entry.animation)))
                .collect();
            (now, snapshot)
        };

        let mut dispatched = 0;
        for (id, animation) in snapshot {
            if !self.inner.borrow().holds(id, &animation) {
                continue;
            }
            match animation.upgrade() {
                Some(animation) => {
                    animation.on_animation_frame(now)?;
                    dispatched += 1;
                }
                None => {
                    tracing::warn!("AnimationRegistry: pruning dropped animation {}", id);
                    self.unregister_id(id)?;
                }
            }
        }

        self.inner.borrow_mut().ticks += 1;
        tracing::trace!("AnimationRegistry: tick at {}ms dispatched {}", now, dispatched);
        Ok(dispatched)
    }

    // =========================================================================
    // Timing environment
    // =========================================================================

    /// Rebind the timing environment
    ///
    /// The current tick source is stopped and released; if animations remain,
    /// a source of the newly selected kind is started before returning. The
    /// old and new sources never run together.
    pub fn set_timing_environment(
        &self,
        environment: Option<Rc<dyn TimingEnvironment>>,
    ) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.release_source()?;
        inner.environment = environment;

        tracing::debug!(
            "AnimationRegistry: timing environment {}",
            if inner.environment.is_some() { "bound" } else { "cleared" }
        );

        if !inner.entries.is_empty() {
            self.ensure_ticking(&mut inner)?;
        }
        Ok(())
    }

    /// The bound timing environment
    pub fn timing_environment(&self) -> Option<Rc<dyn TimingEnvironment>> {
        self.inner.borrow().environment.clone()
    }

    /// Whether `environment` is the bound one
    pub fn is_timing_environment(&self, environment: &Rc<dyn TimingEnvironment>) -> bool {
        self.inner
            .borrow()
            .environment
            .as_ref()
            .is_some_and(|bound| same_environment(bound, environment))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Return to the never-used state
    ///
    /// Stops and releases the tick source, forgets every animation and unbinds
    /// the environment. Ids keep increasing so a tick in progress never
    /// mistakes a newcomer for an animation it snapshotted. Safe to call from
    /// inside a tick callback.
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.release_source()?;
        inner.entries.clear();
        inner.by_identity.clear();
        inner.environment = None;
        inner.ticks = 0;
        tracing::debug!("AnimationRegistry: reset");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Number of registered animations
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    pub fn contains<A: AnimationFrame + 'static>(&self, animation: &Rc<A>) -> bool {
        self.id_of(animation).is_some()
    }

    /// Registration id of an animation, if registered
    pub fn id_of<A: AnimationFrame + 'static>(&self, animation: &Rc<A>) -> Option<AnimationId> {
        let animation: Rc<dyn AnimationFrame> = Rc::clone(animation) as Rc<dyn AnimationFrame>;
        self.inner
            .borrow()
            .by_identity
            .get(&identity_of(&animation))
            .copied()
    }

    /// Registered ids in dispatch order
    pub fn ids(&self) -> Vec<AnimationId> {
        self.inner.borrow().entries.keys().copied().collect()
    }

    /// Whether the shared tick source is active
    pub fn is_ticking(&self) -> bool {
        self.inner.borrow().is_ticking()
    }

    /// Kind of the live tick source
    pub fn active_kind(&self) -> Option<TickSourceKind> {
        self.inner.borrow().source.as_ref().map(|s| s.kind())
    }

    /// Number of ticks dispatched since creation or the last reset
    pub fn tick_count(&self) -> u64 {
        self.inner.borrow().ticks
    }

    /// Period used by interval ticking
    pub fn tick_interval(&self) -> Duration {
        self.inner.borrow().config.interval()
    }

    pub fn config(&self) -> SchedulerConfig {
        self.inner.borrow().config.clone()
    }

    /// Current time as animations would see it
    ///
    /// Always read from the timer host's clock. A bound environment decides
    /// when ticks happen, not what time they report.
    pub fn now_ms(&self) -> f64 {
        self.inner.borrow().now_ms()
    }
}
