//! Deduplicating writes to a media device.
//!
//! Media engines are expensive and sometimes buggy to write to: every position
//! assignment triggers a seek, some engines truncate the position precision
//! after a while of playback (so a freshly written value never reads back
//! exactly), and some ignore rate assignments very close to 1.0. The
//! [`DeviceWriteAdapter`] remembers, per device and per attribute, which value
//! it last wrote and what the device reported right before, and skips writes
//! that would only repeat history.

use std::collections::HashMap;

use crate::device::{DeviceId, MediaDevice, PlayError};
use crate::rates::SupportedRates;

/// Readback tolerance for a position the device truncated.
pub const POSITION_EPSILON: f64 = 0.001;

/// One remembered write: what the device reported before, and what was written.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WriteRecord {
    pub observed: f64,
    pub written: f64,
}

/// Write history of a single device.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WriteMemo {
    pub position: Option<WriteRecord>,
    pub rate: Option<WriteRecord>,
}

/// Wrapper that performs all device mutations of a session.
///
/// The write history is an adapter-owned side table keyed by [`DeviceId`];
/// entries are created on the first write to a device and live as long as the
/// adapter.
#[derive(Debug, Default)]
pub struct DeviceWriteAdapter {
    rates: SupportedRates,
    memos: HashMap<DeviceId, WriteMemo>,
}

impl DeviceWriteAdapter {
    /// Create an adapter that clamps rates into `rates`.
    pub fn new(rates: SupportedRates) -> Self {
        Self {
            rates,
            memos: HashMap::new(),
        }
    }

    /// The configured rate range.
    pub fn rates(&self) -> SupportedRates {
        self.rates
    }

    /// Write history for a device, if anything was written to it.
    pub fn memo(&self, id: DeviceId) -> Option<&WriteMemo> {
        self.memos.get(&id)
    }

    /// Drop the write history of a device.
    pub fn forget(&mut self, id: DeviceId) {
        self.memos.remove(&id);
    }

    /// Seek `device` to `next`, given that it reported `observed` this tick.
    ///
    /// The write is skipped when it repeats the last write, the device still
    /// reads back the written value within [`POSITION_EPSILON`], and either
    /// the device reported the same value as before that write or `observed`
    /// is itself within [`POSITION_EPSILON`] of `next`. A seek the device
    /// dropped is therefore written again. Returns whether the device was
    /// written.
    pub fn set_position<D: MediaDevice + ?Sized>(&mut self, device: &mut D, observed: f64, next: f64) -> bool {
        let id = device.id();
        let memo = self.memos.entry(id).or_default();

        if let Some(last) = memo.position {
            let readback = device.position();
            let held = (readback - last.written).abs() <= POSITION_EPSILON;
            let truncated = (observed - next).abs() <= POSITION_EPSILON;
            if last.written == next && held && (last.observed == observed || truncated) {
                log::trace!("{}: skipping position write {} (observed {})", id, next, observed);
                return false;
            }
            if last.written == next && !held {
                log::trace!("{}: position {} was dropped (reads {})", id, next, readback);
            }
        }

        log::trace!("{}: position {} -> {}", id, observed, next);
        device.set_position(next);
        memo.position = Some(WriteRecord {
            observed,
            written: next,
        });
        true
    }

    /// Assign a playback rate, given that the device reported `observed`.
    ///
    /// `next` is clamped into the supported range and nudged away from 1.0
    /// when it sits just off it. The write is skipped when the
    /// (observed, clamped) pair matches the last write. Returns whether the
    /// device was written.
    pub fn set_rate<D: MediaDevice + ?Sized>(&mut self, device: &mut D, observed: f64, next: f64) -> bool {
        let id = device.id();
        let rate = self.rates.writable(next);
        let record = WriteRecord {
            observed,
            written: rate,
        };
        let memo = self.memos.entry(id).or_default();

        if memo.rate == Some(record) {
            log::trace!("{}: skipping rate write {} (observed {})", id, rate, observed);
            return false;
        }

        if rate != next {
            log::trace!("{}: rate {} adjusted to {}", id, next, rate);
        }
        log::trace!("{}: rate {} -> {}", id, observed, rate);
        device.set_rate(rate);
        memo.rate = Some(record);
        true
    }

    /// Start playback unless the device is already playing.
    ///
    /// A rejection is returned to the caller; it is never retried here.
    pub fn play<D: MediaDevice + ?Sized>(&mut self, device: &mut D) -> Result<(), PlayError> {
        if !device.is_paused() {
            return Ok(());
        }
        log::trace!("{}: play", device.id());
        device.play()
    }

    /// Pause playback unless the device is already paused. Returns whether
    /// the device was written.
    pub fn pause<D: MediaDevice + ?Sized>(&mut self, device: &mut D) -> bool {
        if device.is_paused() {
            return false;
        }
        log::trace!("{}: pause", device.id());
        device.pause();
        true
    }
}
