//! Simulated media engine.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::VirtualClock;
use crate::device::{DeviceId, MediaDevice, PlayError};
use crate::rates::{DEFAULT_MAX_RATE, DEFAULT_MIN_RATE};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Misbehaviours real engines are known for.
#[derive(Clone, Debug)]
pub struct DeviceQuirks {
    /// Positions read back rounded down to this step.
    pub position_precision: Option<f64>,
    /// Number of upcoming play() calls to refuse.
    pub rejected_plays: u32,
    /// Rate assignments closer to 1.0 than this are ignored.
    pub unity_dead_zone: Option<f64>,
    /// Rate assignments below this are ignored.
    pub min_rate: f64,
    /// Rate assignments above this are ignored.
    pub max_rate: f64,
    /// After each play() the playhead jumps back by this much once.
    pub playhead_reset: Option<f64>,
}

impl Default for DeviceQuirks {
    fn default() -> Self {
        Self {
            position_precision: None,
            rejected_plays: 0,
            unity_dead_zone: None,
            min_rate: DEFAULT_MIN_RATE,
            max_rate: DEFAULT_MAX_RATE,
            playhead_reset: None,
        }
    }
}

/// Calls made on a device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub position_writes: u32,
    pub rate_writes: u32,
    pub play_calls: u32,
    pub pause_calls: u32,
    pub rejected_plays: u32,
}

impl DeviceStats {
    /// Every mutating call, rejected plays included.
    pub fn total_writes(&self) -> u32 {
        self.position_writes + self.rate_writes + self.play_calls + self.pause_calls
    }
}

/// State of the modelled engine.
#[derive(Clone, Debug)]
pub struct DeviceModel {
    pub position: f64,
    pub duration: f64,
    pub rate: f64,
    pub paused: bool,
    pub quirks: DeviceQuirks,
    pub stats: DeviceStats,
    pending_reset: bool,
    last_sync: f64,
}

impl DeviceModel {
    fn sync(&mut self, now: f64) {
        let dt = now - self.last_sync;
        self.last_sync = now;
        if self.paused || dt <= 0.0 {
            return;
        }
        if self.pending_reset {
            self.pending_reset = false;
            if let Some(jump) = self.quirks.playhead_reset {
                self.position = (self.position - jump).max(0.0);
            }
        }
        self.position += self.rate * dt;
        if self.duration.is_finite() && self.position >= self.duration {
            self.position = self.duration;
            self.paused = true;
        }
    }

    fn read_position(&self) -> f64 {
        match self.quirks.position_precision {
            Some(step) if step > 0.0 => (self.position / step).floor() * step,
            _ => self.position,
        }
    }

    fn accepts_rate(&self, rate: f64) -> bool {
        if rate < self.quirks.min_rate || rate > self.quirks.max_rate {
            return false;
        }
        match self.quirks.unity_dead_zone {
            Some(zone) => rate == 1.0 || (rate - 1.0).abs() >= zone,
            None => true,
        }
    }
}

/// Clonable handle to a simulated media engine.
///
/// The playhead advances with the shared [`VirtualClock`] while playing and
/// stops at the end of the media.
#[derive(Clone, Debug)]
pub struct SimDevice {
    id: DeviceId,
    clock: VirtualClock,
    model: Rc<RefCell<DeviceModel>>,
}

impl SimDevice {
    /// A paused device at position 0, rate 1.
    pub fn new(clock: &VirtualClock, duration: f64) -> Self {
        let model = DeviceModel {
            position: 0.0,
            duration,
            rate: 1.0,
            paused: true,
            quirks: DeviceQuirks::default(),
            stats: DeviceStats::default(),
            pending_reset: false,
            last_sync: clock.now(),
        };
        Self {
            id: DeviceId::new(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed)),
            clock: clock.clone(),
            model: Rc::new(RefCell::new(model)),
        }
    }

    /// Modify the model directly, bypassing write counters.
    pub fn configure(&self, f: impl FnOnce(&mut DeviceModel)) {
        let mut model = self.model.borrow_mut();
        model.sync(self.clock.now());
        f(&mut model);
    }

    /// Read-only view of the model.
    pub fn model(&self) -> Ref<'_, DeviceModel> {
        self.model.borrow_mut().sync(self.clock.now());
        self.model.borrow()
    }

    /// Calls made so far.
    pub fn stats(&self) -> DeviceStats {
        self.model.borrow().stats
    }

    /// Forget the call counters.
    pub fn reset_stats(&self) {
        self.model.borrow_mut().stats = DeviceStats::default();
    }

    fn with_model<R>(&self, f: impl FnOnce(&mut DeviceModel) -> R) -> R {
        let mut model = self.model.borrow_mut();
        model.sync(self.clock.now());
        f(&mut model)
    }
}

impl MediaDevice for SimDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn position(&self) -> f64 {
        self.with_model(|m| m.read_position())
    }

    fn set_position(&mut self, position: f64) {
        self.with_model(|m| {
            m.stats.position_writes += 1;
            m.position = if m.duration.is_finite() {
                position.clamp(0.0, m.duration.max(0.0))
            } else {
                position.max(0.0)
            };
        });
    }

    fn duration(&self) -> f64 {
        self.with_model(|m| m.duration)
    }

    fn rate(&self) -> f64 {
        self.with_model(|m| m.rate)
    }

    fn set_rate(&mut self, rate: f64) {
        self.with_model(|m| {
            m.stats.rate_writes += 1;
            if m.accepts_rate(rate) {
                m.rate = rate;
            } else {
                log::trace!("Simulated device ignored rate {}", rate);
            }
        });
    }

    fn is_paused(&self) -> bool {
        self.with_model(|m| m.paused)
    }

    fn play(&mut self) -> Result<(), PlayError> {
        self.with_model(|m| {
            m.stats.play_calls += 1;
            if m.quirks.rejected_plays > 0 {
                m.quirks.rejected_plays -= 1;
                m.stats.rejected_plays += 1;
                return Err(PlayError::new("play() is not allowed without user interaction"));
            }
            m.paused = false;
            m.pending_reset = m.quirks.playhead_reset.is_some();
            Ok(())
        })
    }

    fn pause(&mut self) {
        self.with_model(|m| {
            m.stats.pause_calls += 1;
            m.paused = true;
        });
    }
}
