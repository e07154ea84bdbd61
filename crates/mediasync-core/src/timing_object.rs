//! The external timing object the device is locked to.

use crate::host::Subscription;
use crate::vector::TimingStateVector;

/// Listener invoked when a timing object changes its motion.
pub type ChangeListener = Box<dyn FnMut()>;

/// An independently clocked motion source.
///
/// `query` must return the vector as of "now" on the timing object's clock.
/// Change notifications fire on discontinuities (seeks, velocity or
/// acceleration changes), not on ordinary progress.
pub trait TimingObject {
    /// Current motion snapshot.
    fn query(&self) -> TimingStateVector;

    /// Register a change listener. Cancelling the returned subscription
    /// removes it.
    fn subscribe_change(&self, listener: ChangeListener) -> Subscription;
}

impl<T: TimingObject + ?Sized> TimingObject for std::rc::Rc<T> {
    fn query(&self) -> TimingStateVector {
        (**self).query()
    }

    fn subscribe_change(&self, listener: ChangeListener) -> Subscription {
        (**self).subscribe_change(listener)
    }
}
