//! Animation frame callback contract

use cadence_platform::Result;
use std::fmt;
use std::rc::Rc;

/// Implemented by anything the registry should tick
///
/// The registry only ever holds a weak reference: registering does not keep
/// an animation alive, and unregistering never drops it.
///
/// # Example
///
/// ```ignore
/// use cadence_animation::{register_animation, AnimationFrame};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// struct Fade {
///     last_frame: Cell<f64>,
/// }
///
/// impl AnimationFrame for Fade {
///     fn on_animation_frame(&self, now_ms: f64) -> cadence_platform::Result<()> {
///         self.last_frame.set(now_ms);
///         Ok(())
///     }
/// }
///
/// let fade = Rc::new(Fade { last_frame: Cell::new(0.0) });
/// register_animation(&fade)?;
/// ```
pub trait AnimationFrame {
    /// Called once per tick with the tick's timestamp
    ///
    /// Every animation in a tick sees the same `now_ms`. Implementations may
    /// register or unregister animations, themselves included. An error
    /// (usually [`TimingError::Animation`]) abandons the rest of the tick and
    /// surfaces to whoever pumped it.
    ///
    /// [`TimingError::Animation`]: cadence_platform::TimingError::Animation
    fn on_animation_frame(&self, now_ms: f64) -> Result<()>;
}

/// Registration identifier
///
/// Assigned in increasing order at registration and kept for as long as the
/// animation stays registered. Ticks dispatch in ascending id order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnimationId(pub(crate) u64);

impl AnimationId {
    /// Raw identifier value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AnimationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "anim#{}", self.0)
    }
}

/// Identity of an animation allocation
pub(crate) fn identity_of(animation: &Rc<dyn AnimationFrame>) -> usize {
    Rc::as_ptr(animation) as *const () as usize
}
