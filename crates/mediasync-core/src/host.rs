//! Host scheduling primitives.
//!
//! The scheduler never touches real timers or a display. It asks a [`Host`]
//! for a repaint callback, a recurring timer and the visibility flag, and gets
//! back [`Subscription`]s it can cancel.

use std::time::Duration;

/// Callback for a single repaint.
pub type RepaintCallback = Box<dyn FnOnce()>;

/// Callback for every firing of a recurring timer.
pub type TimerCallback = Box<dyn FnMut()>;

/// Cancellable registration of a trigger.
///
/// Cancelling is idempotent. Dropping a subscription does NOT cancel it.
#[must_use = "a subscription must be kept to be cancelled"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Create a subscription that runs `cancel` once when cancelled.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel the registration.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Whether `cancel` has not yet run.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// The triggers active for one scheduler mode.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    pub change: Option<Subscription>,
    pub timer: Option<Subscription>,
    pub repaint: Option<Subscription>,
}

impl SubscriptionSet {
    /// Cancel every trigger in the set.
    pub fn cancel_all(&mut self) {
        for sub in [&mut self.change, &mut self.timer, &mut self.repaint] {
            if let Some(mut sub) = sub.take() {
                sub.cancel();
            }
        }
    }

    /// Whether no trigger is registered.
    pub fn is_empty(&self) -> bool {
        self.change.is_none() && self.timer.is_none() && self.repaint.is_none()
    }
}

/// Which scheduling primitives a host provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostCapabilities {
    pub repaint: bool,
    pub interval: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            repaint: true,
            interval: true,
        }
    }
}

/// Scheduling primitives supplied by the host environment.
pub trait Host {
    /// Primitives this host supports. Checked once at session start.
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::default()
    }

    /// Run `callback` once before the next display refresh.
    fn request_repaint(&self, callback: RepaintCallback) -> Subscription;

    /// Run `callback` every `period` until cancelled.
    fn set_interval(&self, period: Duration, callback: TimerCallback) -> Subscription;

    /// Whether the host is currently visible (repaints only arrive while it is).
    fn is_visible(&self) -> bool;
}

impl<H: Host + ?Sized> Host for std::rc::Rc<H> {
    fn capabilities(&self) -> HostCapabilities {
        (**self).capabilities()
    }

    fn request_repaint(&self, callback: RepaintCallback) -> Subscription {
        (**self).request_repaint(callback)
    }

    fn set_interval(&self, period: Duration, callback: TimerCallback) -> Subscription {
        (**self).set_interval(period, callback)
    }

    fn is_visible(&self) -> bool {
        (**self).is_visible()
    }
}
