//! The playback device under control.
//!
//! A [`MediaDevice`] is owned by the host integration. The control loop reads
//! it once per tick into a [`DeviceSample`] and mutates it only through the
//! [`DeviceWriteAdapter`](crate::adapter::DeviceWriteAdapter).

use thiserror::Error;

/// Identity of a device, used to key per-device write history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

impl DeviceId {
    /// Create a device id from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// A media engine refused a programmatic play (autoplay policy and similar).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct PlayError {
    pub reason: String,
}

impl PlayError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Capabilities the control loop consumes from a media engine.
///
/// Positions and durations are in seconds. Implementations may be imprecise:
/// positions can be quantized, rate assignments can be ignored, and `play`
/// can be refused. The adapter compensates for all of that.
pub trait MediaDevice {
    /// Stable identity of this device.
    fn id(&self) -> DeviceId;

    /// Current playhead position.
    fn position(&self) -> f64;

    /// Seek the playhead.
    fn set_position(&mut self, position: f64);

    /// Media duration. May be NaN or infinite while unknown.
    fn duration(&self) -> f64;

    /// Current playback rate.
    fn rate(&self) -> f64;

    /// Assign the playback rate.
    fn set_rate(&mut self, rate: f64);

    /// Whether playback is paused.
    fn is_paused(&self) -> bool;

    /// Start playback.
    fn play(&mut self) -> Result<(), PlayError>;

    /// Pause playback.
    fn pause(&mut self);
}

/// Read-only snapshot of a device, taken once per tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceSample {
    pub position: f64,
    pub duration: f64,
    pub rate: f64,
    pub paused: bool,
}

impl DeviceSample {
    /// Sample the device.
    pub fn read<D: MediaDevice + ?Sized>(device: &D) -> Self {
        Self {
            position: device.position(),
            duration: device.duration(),
            rate: device.rate(),
            paused: device.is_paused(),
        }
    }

    /// Duration with unknown or unbounded values mapped to 0.
    pub fn sanitized_duration(&self) -> f64 {
        if self.duration.is_finite() {
            self.duration
        } else {
            0.0
        }
    }
}
