//! Deterministic stand-ins for the external collaborators.
//!
//! Everything here runs on a shared [`VirtualClock`] that only moves when
//! [`ManualHost::advance`] (or [`VirtualClock::advance`]) is called, so a
//! whole session can be driven tick by tick from a test or a CLI scenario.
//!
//! - [`SimDevice`] - media engine model with configurable quirks
//! - [`SimTimingObject`] - constant-acceleration motion source
//! - [`ManualHost`] - repaint callbacks, interval timers and visibility

mod device;
mod host;
mod timing;

pub use device::{DeviceModel, DeviceQuirks, DeviceStats, SimDevice};
pub use host::ManualHost;
pub use timing::SimTimingObject;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Shared virtual time in seconds.
#[derive(Clone, Debug, Default)]
pub struct VirtualClock {
    now: Rc<Cell<f64>>,
}

impl VirtualClock {
    /// A clock at 0 seconds.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock starting at `seconds`.
    pub fn starting_at(seconds: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(seconds)),
        }
    }

    /// Current time in seconds.
    pub fn now(&self) -> f64 {
        self.now.get()
    }

    /// Move the clock to an absolute time. Time never runs backwards.
    pub fn set(&self, seconds: f64) {
        if seconds > self.now.get() {
            self.now.set(seconds);
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by.as_secs_f64());
    }
}
