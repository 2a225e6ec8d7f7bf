//! Cadence Animation Scheduler
//!
//! One shared tick drives every running animation.
//!
//! # Features
//!
//! - **Shared Tick Source**: Created on the first registration, released with the last
//! - **Interval or Paint Ticking**: Repeating timer, or once before each repaint when a
//!   timing environment is bound
//! - **Consistent Timestamps**: Every animation in a tick sees the same "now"
//! - **Re-entrant**: Animations may register and unregister from inside their callback
//! - **Per-thread Registry**: Free functions share one registry per event-loop thread

pub mod config;
pub mod frame;
pub mod global;
pub mod registry;
pub mod tick_source;

pub use cadence_platform::{Result, TimingError};
pub use config::{SchedulerConfig, TICK_INTERVAL, TICK_INTERVAL_MS};
pub use frame::{AnimationFrame, AnimationId};
pub use global::{
    default_timer_queue, install_registry, is_animation_window, is_registry_installed,
    register_animation, registry, set_animation_window, tear_down, try_registry,
    uninstall_registry, unregister_animation,
};
pub use registry::AnimationRegistry;
pub use tick_source::{
    create_tick_source, IntervalTickSource, PaintTickSource, TickHandler, TickSource,
    TickSourceKind,
};
