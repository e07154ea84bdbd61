//! Side channel for things the control loop absorbs but a host may care about.

use crossbeam_channel::{Sender, TrySendError};

use crate::device::DeviceId;
use crate::error::SyncError;
use crate::scheduler::Mode;

/// Notable occurrences inside a running session.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    /// The device refused play(). Always a [`SyncError::DeviceRejectedPlay`];
    /// the next tick will try again.
    PlayRejected { device: DeviceId, error: SyncError },
    /// The scheduler switched between idle and polling.
    ModeChanged { from: Mode, to: Mode },
    /// The strategy re-targeted the device position.
    Resynchronized { position: f64, velocity: f64, delay: f64 },
    /// A tick was skipped because the timing vector was malformed.
    TickSkipped,
}

/// Non-blocking sender for [`SyncEvent`]s.
///
/// Events are dropped when no receiver is attached, the receiver is gone, or
/// a bounded channel is full.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<Sender<SyncEvent>>,
}

impl EventSink {
    /// A sink that forwards to `tx`.
    pub fn new(tx: Sender<SyncEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Forward an event.
    pub fn emit(&self, event: SyncEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::trace!("Event channel full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
