//! Manually driven host.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use super::VirtualClock;
use crate::host::{Host, HostCapabilities, RepaintCallback, Subscription, TimerCallback};

struct TimerSlot {
    id: u64,
    period: f64,
    due: f64,
    callback: Option<TimerCallback>,
}

struct Inner {
    clock: VirtualClock,
    timers: RefCell<Vec<TimerSlot>>,
    repaints: RefCell<Vec<(u64, RepaintCallback)>>,
    visible: Cell<bool>,
    capabilities: Cell<HostCapabilities>,
    next_id: Cell<u64>,
    timers_created: Cell<u32>,
    repaints_requested: Cell<u32>,
}

impl Inner {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

/// Host whose timers and repaints fire only when told to.
///
/// Interval timers fire from [`advance`](Self::advance) in due order; repaint
/// callbacks fire from [`fire_repaint`](Self::fire_repaint), and only while
/// the host is visible. Cancelling from inside a firing callback is safe.
#[derive(Clone)]
pub struct ManualHost {
    inner: Rc<Inner>,
}

impl ManualHost {
    /// A visible host with every capability.
    pub fn new(clock: &VirtualClock) -> Self {
        Self {
            inner: Rc::new(Inner {
                clock: clock.clone(),
                timers: RefCell::new(Vec::new()),
                repaints: RefCell::new(Vec::new()),
                visible: Cell::new(true),
                capabilities: Cell::new(HostCapabilities::default()),
                next_id: Cell::new(0),
                timers_created: Cell::new(0),
                repaints_requested: Cell::new(0),
            }),
        }
    }

    /// Override the reported capabilities.
    pub fn set_capabilities(&self, capabilities: HostCapabilities) {
        self.inner.capabilities.set(capabilities);
    }

    /// Show or hide the host.
    pub fn set_visible(&self, visible: bool) {
        self.inner.visible.set(visible);
    }

    /// The clock this host drives.
    pub fn clock(&self) -> &VirtualClock {
        &self.inner.clock
    }

    /// Number of live interval timers.
    pub fn active_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Number of repaint callbacks waiting for the next frame.
    pub fn pending_repaints(&self) -> usize {
        self.inner.repaints.borrow().len()
    }

    /// Interval timers created so far.
    pub fn timers_created(&self) -> u32 {
        self.inner.timers_created.get()
    }

    /// Repaint callbacks requested so far.
    pub fn repaints_requested(&self) -> u32 {
        self.inner.repaints_requested.get()
    }

    /// Move the clock forward by `by`, firing every timer that falls due on
    /// the way. Returns the number of timer firings.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.inner.clock.now() + by.as_secs_f64();
        let mut fired = 0;

        loop {
            let next = {
                let timers = self.inner.timers.borrow();
                timers
                    .iter()
                    .filter(|slot| slot.callback.is_some() && slot.due <= target + 1e-12)
                    .min_by(|a, b| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))
                    .map(|slot| (slot.id, slot.due))
            };
            let Some((id, due)) = next else {
                break;
            };

            self.inner.clock.set(due);
            let callback = {
                let mut timers = self.inner.timers.borrow_mut();
                timers
                    .iter_mut()
                    .find(|slot| slot.id == id)
                    .and_then(|slot| slot.callback.take())
            };
            let Some(mut callback) = callback else {
                continue;
            };
            callback();
            fired += 1;

            let mut timers = self.inner.timers.borrow_mut();
            if let Some(slot) = timers.iter_mut().find(|slot| slot.id == id) {
                slot.callback = Some(callback);
                slot.due += slot.period;
            }
        }

        self.inner.clock.set(target);
        fired
    }

    /// Run the repaint callbacks requested before this frame. Does nothing
    /// while the host is hidden. Returns the number of callbacks run.
    pub fn fire_repaint(&self) -> usize {
        if !self.inner.visible.get() {
            return 0;
        }
        let ids: Vec<u64> = self.inner.repaints.borrow().iter().map(|(id, _)| *id).collect();
        let mut fired = 0;
        for id in ids {
            let callback = {
                let mut repaints = self.inner.repaints.borrow_mut();
                repaints
                    .iter()
                    .position(|(repaint_id, _)| *repaint_id == id)
                    .map(|index| repaints.remove(index).1)
            };
            if let Some(callback) = callback {
                callback();
                fired += 1;
            }
        }
        fired
    }

    /// Alternate clock advances and frames for `total`, one frame every
    /// `frame`.
    pub fn run_for(&self, total: Duration, frame: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            let step = frame.min(total - elapsed);
            self.advance(step);
            self.fire_repaint();
            elapsed += step;
        }
    }
}

impl Host for ManualHost {
    fn capabilities(&self) -> HostCapabilities {
        self.inner.capabilities.get()
    }

    fn request_repaint(&self, callback: RepaintCallback) -> Subscription {
        let id = self.inner.next_id();
        self.inner.repaints.borrow_mut().push((id, callback));
        self.inner.repaints_requested.set(self.inner.repaints_requested.get() + 1);

        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.repaints.borrow_mut().retain(|(repaint_id, _)| *repaint_id != id);
            }
        })
    }

    fn set_interval(&self, period: Duration, callback: TimerCallback) -> Subscription {
        let id = self.inner.next_id();
        let period = period.as_secs_f64();
        self.inner.timers.borrow_mut().push(TimerSlot {
            id,
            period,
            due: self.inner.clock.now() + period,
            callback: Some(callback),
        });
        self.inner.timers_created.set(self.inner.timers_created.get() + 1);

        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.timers.borrow_mut().retain(|slot| slot.id != id);
            }
        })
    }

    fn is_visible(&self) -> bool {
        self.inner.visible.get()
    }
}

impl std::fmt::Debug for ManualHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualHost")
            .field("now", &self.inner.clock.now())
            .field("timers", &self.active_timers())
            .field("repaints", &self.pending_repaints())
            .field("visible", &self.inner.visible.get())
            .finish()
    }
}
