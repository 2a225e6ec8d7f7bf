//! Cadence Timing Primitives
//!
//! This crate provides the host-side timing building blocks the animation
//! scheduler runs on.
//!
//! # Architecture
//!
//! - [`Clock`] - Millisecond time source ([`SystemClock`], [`MockClock`])
//! - [`TimerHost`] - "Repeat every N ms" primitive, implemented by [`TimerQueue`]
//! - [`TimingEnvironment`] - "Run before next paint" primitive, implemented by
//!   [`FrameWindow`]
//!
//! Everything here is single-threaded: handles are `Rc` based and callbacks run
//! on the thread that pumps the queue or reports the paint.
//!
//! # Example
//!
//! ```ignore
//! use cadence_platform::*;
//! use std::time::Duration;
//!
//! let clock = MockClock::new();
//! let timers = TimerQueue::manual(clock.clone());
//! timers.set_interval(Duration::from_millis(20), Box::new(|| {
//!     println!("tick");
//!     Ok(())
//! }))?;
//! timers.advance(Duration::from_millis(60))?; // prints "tick" three times
//! ```

mod clock;
mod error;
mod timer;
mod window;

// Re-export all public types
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{Result, TimingError};
pub use timer::{TimerCallback, TimerHost, TimerId, TimerQueue};
pub use window::{
    same_environment, FrameWindow, PaintCallback, PaintRequestId, TimingEnvironment,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, MockClock, SystemClock};
    pub use crate::error::{Result, TimingError};
    pub use crate::timer::{TimerHost, TimerQueue};
    pub use crate::window::{FrameWindow, TimingEnvironment};
}
