//! Timing environments
//!
//! A [`TimingEnvironment`] is the host context that can notify code right
//! before the next repaint, the way a browser window offers animation-frame
//! callbacks. [`FrameWindow`] is the in-process implementation: the host's
//! render loop calls [`FrameWindow::paint`] once per frame and every callback
//! requested before that frame runs with the frame's timestamp.

use crate::clock::Clock;
use crate::error::{Result, TimingError};
use slotmap::{new_key_type, SlotMap};
use std::cell::RefCell;
use std::rc::Rc;

new_key_type! {
    /// Handle to a pending before-paint callback
    pub struct PaintRequestId;
}

/// One-shot callback run before the next repaint with the frame timestamp
pub type PaintCallback = Box<dyn FnOnce(f64) -> Result<()>>;

/// Host context able to deliver before-paint notifications
pub trait TimingEnvironment {
    /// Current time in the environment's clock
    fn now_ms(&self) -> f64;

    /// Whether [`TimingEnvironment::request_paint_callback`] is usable
    fn supports_paint_callbacks(&self) -> bool;

    /// Run `callback` once, right before the next repaint
    fn request_paint_callback(&self, callback: PaintCallback) -> Result<PaintRequestId>;

    /// Cancel a pending request
    ///
    /// Cancelling a request that already ran or was never issued is a no-op.
    fn cancel_paint_callback(&self, id: PaintRequestId) -> Result<()>;
}

/// Compare two environments by identity
pub fn same_environment(a: &Rc<dyn TimingEnvironment>, b: &Rc<dyn TimingEnvironment>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

struct PaintRequest {
    seq: u64,
    callback: PaintCallback,
}

struct FrameWindowInner {
    pending: SlotMap<PaintRequestId, PaintRequest>,
    next_seq: u64,
    frames: u64,
}

/// A host window whose render loop reports each repaint
///
/// Cloning yields another handle to the same window.
#[derive(Clone)]
pub struct FrameWindow {
    inner: Rc<RefCell<FrameWindowInner>>,
    clock: Rc<dyn Clock>,
    paint_callbacks: bool,
}

impl FrameWindow {
    /// A window able to deliver before-paint callbacks
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self::build(Rc::new(clock), true)
    }

    /// A window lacking before-paint support
    ///
    /// Code selecting paint-synchronized ticking for this window must fall
    /// back to a timer.
    pub fn without_paint_callbacks(clock: impl Clock + 'static) -> Self {
        Self::build(Rc::new(clock), false)
    }

    fn build(clock: Rc<dyn Clock>, paint_callbacks: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(FrameWindowInner {
                pending: SlotMap::with_key(),
                next_seq: 0,
                frames: 0,
            })),
            clock,
            paint_callbacks,
        }
    }

    /// Number of callbacks waiting for the next paint
    pub fn pending_count(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Number of paints reported so far
    pub fn frame_count(&self) -> u64 {
        self.inner.borrow().frames
    }

    /// Report a repaint, running every callback requested before it
    ///
    /// Callbacks requested while this paint is running wait for the next one,
    /// and callbacks cancelled by an earlier callback of the same paint do not
    /// run. They run in request order with the same timestamp. If one fails,
    /// the callbacks not yet run stay queued under their original ids and the
    /// error is returned.
    pub fn paint(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let mut due: Vec<(u64, PaintRequestId)> = {
            let mut inner = self.inner.borrow_mut();
            inner.frames += 1;
            inner
                .pending
                .iter()
                .map(|(id, request)| (request.seq, id))
                .collect()
        };
        due.sort_unstable_by_key(|(seq, _)| *seq);

        let mut ran = 0;
        for (_, id) in due {
            let Some(request) = self.inner.borrow_mut().pending.remove(id) else {
                continue;
            };
            (request.callback)(now)?;
            ran += 1;
        }

        tracing::trace!("FrameWindow: painted frame at {}ms ({} callbacks)", now, ran);
        Ok(ran)
    }
}

impl TimingEnvironment for FrameWindow {
    fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    fn supports_paint_callbacks(&self) -> bool {
        self.paint_callbacks
    }

    fn request_paint_callback(&self, callback: PaintCallback) -> Result<PaintRequestId> {
        if !self.paint_callbacks {
            return Err(TimingError::PaintUnavailable(
                "window has no before-paint notifications".to_string(),
            ));
        }

        let mut inner = self.inner.borrow_mut();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        Ok(inner.pending.insert(PaintRequest { seq, callback }))
    }

    fn cancel_paint_callback(&self, id: PaintRequestId) -> Result<()> {
        self.inner.borrow_mut().pending.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use std::time::Duration;

    #[test]
    fn test_paint_runs_pending_callbacks_once() {
        let clock = MockClock::new();
        let window = FrameWindow::new(clock.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));

        for _ in 0..2 {
            let seen = Rc::clone(&seen);
            window
                .request_paint_callback(Box::new(move |now| {
                    seen.borrow_mut().push(now);
                    Ok(())
                }))
                .unwrap();
        }
        assert_eq!(window.pending_count(), 2);

        clock.advance(Duration::from_millis(16));
        assert_eq!(window.paint().unwrap(), 2);
        assert_eq!(*seen.borrow(), vec![16.0, 16.0]);

        assert_eq!(window.paint().unwrap(), 0);
        assert_eq!(window.frame_count(), 2);
    }

    #[test]
    fn test_request_during_paint_waits_for_next_frame() {
        let window = FrameWindow::new(MockClock::new());
        let count = Rc::new(RefCell::new(0));

        let w = window.clone();
        let c = Rc::clone(&count);
        window
            .request_paint_callback(Box::new(move |_| {
                *c.borrow_mut() += 1;
                let c = Rc::clone(&c);
                w.request_paint_callback(Box::new(move |_| {
                    *c.borrow_mut() += 1;
                    Ok(())
                }))?;
                Ok(())
            }))
            .unwrap();

        window.paint().unwrap();
        assert_eq!(*count.borrow(), 1);
        assert_eq!(window.pending_count(), 1);

        window.paint().unwrap();
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn test_cancel_removes_request() {
        let window = FrameWindow::new(MockClock::new());
        let id = window.request_paint_callback(Box::new(|_| Ok(()))).unwrap();

        window.cancel_paint_callback(id).unwrap();
        assert_eq!(window.pending_count(), 0);
        window.cancel_paint_callback(id).unwrap();
    }

    #[test]
    fn test_failed_callback_keeps_rest_queued() {
        let window = FrameWindow::new(MockClock::new());
        window
            .request_paint_callback(Box::new(|_| Err(TimingError::Host("lost".to_string()))))
            .unwrap();
        window.request_paint_callback(Box::new(|_| Ok(()))).unwrap();

        assert!(window.paint().is_err());
        assert_eq!(window.pending_count(), 1);
        assert_eq!(window.paint().unwrap(), 1);
    }

    #[test]
    fn test_failed_paint_keeps_request_ids() {
        let window = FrameWindow::new(MockClock::new());
        let ran = Rc::new(RefCell::new(false));
        window
            .request_paint_callback(Box::new(|_| Err(TimingError::Host("lost".to_string()))))
            .unwrap();
        let r = Rc::clone(&ran);
        let id = window
            .request_paint_callback(Box::new(move |_| {
                *r.borrow_mut() = true;
                Ok(())
            }))
            .unwrap();

        assert!(window.paint().is_err());
        window.cancel_paint_callback(id).unwrap();
        assert_eq!(window.pending_count(), 0);
        assert_eq!(window.paint().unwrap(), 0);
        assert!(!*ran.borrow());
    }

    #[test]
    fn test_cancel_during_paint_skips_request() {
        let window = FrameWindow::new(MockClock::new());
        let ran = Rc::new(RefCell::new(false));
        let victim = Rc::new(RefCell::new(None));

        let w = window.clone();
        let v = Rc::clone(&victim);
        window
            .request_paint_callback(Box::new(move |_| {
                if let Some(id) = v.borrow_mut().take() {
                    w.cancel_paint_callback(id)?;
                }
                Ok(())
            }))
            .unwrap();
        let r = Rc::clone(&ran);
        let id = window
            .request_paint_callback(Box::new(move |_| {
                *r.borrow_mut() = true;
                Ok(())
            }))
            .unwrap();
        *victim.borrow_mut() = Some(id);

        assert_eq!(window.paint().unwrap(), 1);
        assert!(!*ran.borrow());
    }

    #[test]
    fn test_window_without_paint_support_rejects_requests() {
        let window = FrameWindow::without_paint_callbacks(MockClock::new());
        assert!(!window.supports_paint_callbacks());
        assert!(matches!(
            window.request_paint_callback(Box::new(|_| Ok(()))),
            Err(TimingError::PaintUnavailable(_))
        ));
    }

    #[test]
    fn test_same_environment_compares_identity() {
        let a: Rc<dyn TimingEnvironment> = Rc::new(FrameWindow::new(MockClock::new()));
        let b: Rc<dyn TimingEnvironment> = Rc::new(FrameWindow::new(MockClock::new()));
        let a2 = Rc::clone(&a);

        assert!(same_environment(&a, &a2));
        assert!(!same_environment(&a, &b));
    }
}
