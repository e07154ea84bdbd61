//! Supported playback-rate range.
//!
//! Media engines reject rates outside a platform-specific window (commonly
//! `[0.0625, 16]`), some reject negative rates outright, and some silently
//! ignore assignments that land very close to 1.0. [`SupportedRates`] is the
//! plain configuration value the control loop uses to stay inside that window.
//! It is computed once by the host integration, for example with
//! [`SupportedRates::detect`], and never re-probed by the loop.

use serde::{Deserialize, Serialize};

use crate::device::MediaDevice;
use crate::error::{Result, SyncError};

/// Lowest rate most engines accept.
pub const DEFAULT_MIN_RATE: f64 = 0.0625;

/// Highest rate most engines accept.
pub const DEFAULT_MAX_RATE: f64 = 16.0;

/// Rates closer to 1.0 than this are pushed out to `1.0 ± UNITY_SNAP`.
pub const UNITY_SNAP: f64 = 0.01;

const PROBE_MIN_CANDIDATES: [f64; 5] = [0.0625, 0.125, 0.25, 0.5, 1.0];
const PROBE_MAX_CANDIDATES: [f64; 5] = [16.0, 8.0, 4.0, 2.0, 1.0];

/// Inclusive range of playback rates a device accepts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportedRates {
    pub min: f64,
    pub max: f64,
}

impl Default for SupportedRates {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_RATE,
            max: DEFAULT_MAX_RATE,
        }
    }
}

impl SupportedRates {
    /// Create a validated range.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let rates = Self { min, max };
        rates.validate()?;
        Ok(rates)
    }

    /// Check that the range is finite and non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.min.is_finite() && self.max.is_finite() && self.min <= self.max {
            Ok(())
        } else {
            Err(SyncError::InvalidRates {
                min: self.min,
                max: self.max,
            })
        }
    }

    /// Whether `rate` lies inside the range.
    pub fn contains(&self, rate: f64) -> bool {
        rate >= self.min && rate <= self.max
    }

    /// Clamp `rate` into the range.
    pub fn clamp(&self, rate: f64) -> f64 {
        rate.max(self.min).min(self.max)
    }

    /// Push rates that sit just off 1.0 away from it, keeping their direction.
    pub fn snap_near_unity(rate: f64) -> f64 {
        let deviation = rate - 1.0;
        if deviation != 0.0 && deviation.abs() < UNITY_SNAP {
            1.0 + UNITY_SNAP.copysign(deviation)
        } else {
            rate
        }
    }

    /// The rate that is actually safe to assign for a requested `rate`.
    ///
    /// NaN maps to 1.0.
    pub fn writable(&self, rate: f64) -> f64 {
        if rate.is_nan() {
            return self.clamp(1.0);
        }
        self.clamp(Self::snap_near_unity(self.clamp(rate)))
    }

    /// Probe a throwaway device for the rates it accepts.
    ///
    /// Each candidate is assigned and read back; a candidate counts as
    /// supported when the device moves to it from a different rate. The
    /// device's rate is restored afterwards. When no candidate sticks, the
    /// default range is returned.
    pub fn detect<D: MediaDevice + ?Sized>(device: &mut D) -> Self {
        let original = device.rate();

        let min = PROBE_MIN_CANDIDATES
            .iter()
            .copied()
            .find(|&rate| accepts_rate(device, rate));
        let max = PROBE_MAX_CANDIDATES
            .iter()
            .copied()
            .find(|&rate| accepts_rate(device, rate));
        device.set_rate(original);

        match (min, max) {
            (Some(min), Some(max)) if min <= max => {
                log::debug!("Detected supported playback rates [{}, {}]", min, max);
                Self { min, max }
            }
            _ => {
                log::warn!("Rate probe found no accepted rates, using defaults");
                Self::default()
            }
        }
    }
}

/// Whether `device` switches to `rate` when asked.
///
/// A device already at `rate` is first moved away from it; if it cannot be
/// moved, the candidate is unproven and rejected.
fn accepts_rate<D: MediaDevice + ?Sized>(device: &mut D, rate: f64) -> bool {
    if device.rate() == rate {
        for away in [rate * 2.0, rate / 2.0] {
            device.set_rate(away);
            if device.rate() != rate {
                break;
            }
        }
        if device.rate() == rate {
            log::trace!("Cannot move device off rate {}, not counting it", rate);
            return false;
        }
    }
    device.set_rate(rate);
    (device.rate() - rate).abs() < f64::EPSILON
}
