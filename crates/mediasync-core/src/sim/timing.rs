//! Simulated timing object.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::VirtualClock;
use crate::host::Subscription;
use crate::timing_object::{ChangeListener, TimingObject};
use crate::vector::TimingStateVector;

struct Inner {
    clock: VirtualClock,
    anchor: Cell<TimingStateVector>,
    listeners: RefCell<Vec<(u64, Option<ChangeListener>)>>,
    next_listener: Cell<u64>,
}

/// Motion source anchored on the virtual clock.
///
/// Queries extrapolate the anchor to the clock's current time. Every update
/// re-anchors the motion and notifies change listeners.
#[derive(Clone)]
pub struct SimTimingObject {
    inner: Rc<Inner>,
}

impl SimTimingObject {
    /// A timing object at rest at position 0.
    pub fn new(clock: &VirtualClock) -> Self {
        Self::with_vector(clock, 0.0, 0.0)
    }

    /// A timing object moving from `position` at `velocity` as of now.
    pub fn with_vector(clock: &VirtualClock, position: f64, velocity: f64) -> Self {
        Self {
            inner: Rc::new(Inner {
                clock: clock.clone(),
                anchor: Cell::new(TimingStateVector::moving(position, velocity, clock.now())),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    /// Change the motion. Unspecified components continue from the current
    /// vector.
    pub fn update(&self, position: Option<f64>, velocity: Option<f64>, acceleration: Option<f64>) {
        let current = self.query();
        let next = TimingStateVector::new(
            position.unwrap_or(current.position),
            velocity.unwrap_or(current.velocity),
            acceleration.unwrap_or(current.acceleration),
            self.inner.clock.now(),
        );
        log::debug!("Timing object update: {:?}", next);
        self.inner.anchor.set(next);
        self.notify();
    }

    /// Replace the anchor verbatim, malformed values included.
    pub fn set_anchor(&self, vector: TimingStateVector) {
        self.inner.anchor.set(vector);
        self.notify();
    }

    /// Number of registered change listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Fire every listener registered at the time of the call. Listeners may
    /// cancel themselves or others while running.
    pub fn notify(&self) {
        let ids: Vec<u64> = self.inner.listeners.borrow().iter().map(|(id, _)| *id).collect();
        for id in ids {
            let callback = {
                let mut listeners = self.inner.listeners.borrow_mut();
                listeners
                    .iter_mut()
                    .find(|(listener_id, _)| *listener_id == id)
                    .and_then(|(_, callback)| callback.take())
            };
            let Some(mut callback) = callback else {
                continue;
            };
            callback();
            let mut listeners = self.inner.listeners.borrow_mut();
            if let Some((_, slot)) = listeners.iter_mut().find(|(listener_id, _)| *listener_id == id) {
                *slot = Some(callback);
            }
        }
    }
}

impl TimingObject for SimTimingObject {
    fn query(&self) -> TimingStateVector {
        self.inner.anchor.get().at(self.inner.clock.now())
    }

    fn subscribe_change(&self, listener: ChangeListener) -> Subscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner.listeners.borrow_mut().push((id, Some(listener)));

        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }
}

impl std::fmt::Debug for SimTimingObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimTimingObject")
            .field("anchor", &self.inner.anchor.get())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_query_extrapolates() {
        let clock = VirtualClock::starting_at(10.0);
        let timing = SimTimingObject::with_vector(&clock, 5.0, 2.0);
        clock.advance(Duration::from_millis(1500));
        let v = timing.query();
        assert!((v.position - 8.0).abs() < 1e-9);
        assert!((v.timestamp - 11.5).abs() < 1e-9);
    }

    #[test]
    fn test_update_notifies_and_cancel_removes() {
        let clock = VirtualClock::new();
        let timing = SimTimingObject::new(&clock);
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let mut sub = timing.subscribe_change(Box::new(move || counter.set(counter.get() + 1)));

        timing.update(None, Some(1.0), None);
        assert_eq!(hits.get(), 1);
        assert_eq!(timing.query().velocity, 1.0);

        sub.cancel();
        assert_eq!(timing.listener_count(), 0);
        timing.update(Some(3.0), None, None);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_listener_can_cancel_itself() {
        let clock = VirtualClock::new();
        let timing = SimTimingObject::new(&clock);
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let inner_slot = slot.clone();
        let sub = timing.subscribe_change(Box::new(move || {
            if let Some(mut sub) = inner_slot.borrow_mut().take() {
                sub.cancel();
            }
        }));
        *slot.borrow_mut() = Some(sub);

        timing.notify();
        assert_eq!(timing.listener_count(), 0);
    }
}
