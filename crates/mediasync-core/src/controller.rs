//! One synchronization step.
//!
//! A [`SyncController`] owns the device, the strategy state and the write
//! adapter of a session. Each [`tick`](SyncController::tick) samples the
//! device, asks the strategy for a target and moves the device towards it:
//!
//! - target before the start: seek to 0 and pause
//! - target at or past the end: seek to the end and pause
//! - position off target: seek, then apply the velocity
//! - rate off target: apply the velocity
//!
//! "Apply the velocity" means set the rate and play for a moving target, or
//! pause for a stopped one.

use crate::adapter::DeviceWriteAdapter;
use crate::device::{DeviceSample, MediaDevice};
use crate::error::{Result, SyncError};
use crate::events::{EventSink, SyncEvent};
use crate::rates::SupportedRates;
use crate::strategy::{StrategyState, UpdateStrategy, UpdateVector};
use crate::timing_object::TimingObject;
use crate::vector::TimingStateVector;

/// Transformation applied to the queried vector before the strategy runs.
pub type VectorHook = Box<dyn Fn(TimingStateVector) -> TimingStateVector>;

/// Transformation applied to the strategy's target before the device is written.
pub type UpdateHook = Box<dyn Fn(UpdateVector) -> UpdateVector>;

/// What a tick decided.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickOutcome {
    /// Whether the device is supposed to be playing.
    pub moving: bool,
    /// Target handed to the device.
    pub target: UpdateVector,
    /// Whether the strategy re-targeted the device position.
    pub resynchronized: bool,
}

/// Runs the strategy against a device, one tick at a time.
pub struct SyncController<D: MediaDevice> {
    device: D,
    strategy: UpdateStrategy,
    state: Option<StrategyState>,
    adapter: DeviceWriteAdapter,
    prepare_vector: Option<VectorHook>,
    prepare_update: Option<UpdateHook>,
    events: EventSink,
    ticks: u64,
}

impl<D: MediaDevice> SyncController<D> {
    /// Create a controller for `device`.
    pub fn new(device: D, strategy: UpdateStrategy, rates: SupportedRates) -> Self {
        Self {
            device,
            strategy,
            state: None,
            adapter: DeviceWriteAdapter::new(rates),
            prepare_vector: None,
            prepare_update: None,
            events: EventSink::disabled(),
            ticks: 0,
        }
    }

    /// Preprocess every queried vector.
    pub fn with_vector_hook(mut self, hook: Option<VectorHook>) -> Self {
        self.prepare_vector = hook;
        self
    }

    /// Postprocess every strategy target.
    pub fn with_update_hook(mut self, hook: Option<UpdateHook>) -> Self {
        self.prepare_update = hook;
        self
    }

    /// Forward events to `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Run one tick against `timing`.
    ///
    /// A vector with a non-finite component skips the tick: the device is not
    /// written, the strategy state is kept and
    /// [`SyncError::MalformedTimingVector`] is returned.
    pub fn tick<T: TimingObject + ?Sized>(&mut self, timing: &T) -> Result<TickOutcome> {
        self.ticks += 1;
        let sample = DeviceSample::read(&self.device);
        let mut vector = timing.query();
        if let Some(hook) = &self.prepare_vector {
            vector = hook(vector);
        }
        if !vector.is_finite() {
            self.events.emit(SyncEvent::TickSkipped);
            return Err(SyncError::MalformedTimingVector);
        }

        let rates = self.adapter.rates();
        let output = self.strategy.update(&vector, sample.position, self.state, &rates);
        self.state = Some(output.state);

        let mut target = output.target;
        if let Some(hook) = &self.prepare_update {
            target = hook(target);
        }

        log::trace!(
            "Tick {}: vector ({:.3}, {}), device {:.3} -> target ({:.3}, {})",
            self.ticks,
            vector.position,
            vector.velocity,
            sample.position,
            target.position,
            target.velocity
        );

        if output.resynchronized {
            self.events.emit(SyncEvent::Resynchronized {
                position: target.position,
                velocity: target.velocity,
                delay: output.state.media_element_delay(),
            });
        }

        self.apply(&sample, target);

        Ok(TickOutcome {
            moving: target.velocity != 0.0,
            target,
            resynchronized: output.resynchronized,
        })
    }

    fn apply(&mut self, sample: &DeviceSample, target: UpdateVector) {
        let UpdateVector { position, velocity } = target;
        let duration = sample.sanitized_duration();

        if position < 0.0 {
            if sample.position != 0.0 {
                self.adapter.set_position(&mut self.device, sample.position, 0.0);
            }
            self.adapter.pause(&mut self.device);
        } else if position >= duration {
            if sample.position != duration {
                self.adapter.set_position(&mut self.device, sample.position, duration);
            }
            self.adapter.pause(&mut self.device);
        } else if sample.position != position {
            self.adapter.set_position(&mut self.device, sample.position, position);
            self.apply_velocity(sample, velocity);
        } else if sample.rate != velocity || (sample.paused && velocity != 0.0) {
            self.apply_velocity(sample, velocity);
        }
    }

    fn apply_velocity(&mut self, sample: &DeviceSample, velocity: f64) {
        if velocity == 0.0 {
            self.adapter.pause(&mut self.device);
            return;
        }
        self.adapter.set_rate(&mut self.device, sample.rate, velocity);
        if let Err(error) = self.adapter.play(&mut self.device) {
            let device = self.device.id();
            let error = SyncError::from(error);
            log::warn!("{}: {}", device, error);
            self.events.emit(SyncEvent::PlayRejected { device, error });
        }
    }

    /// The controlled device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Strategy state after the last tick, `None` before the first.
    pub fn state(&self) -> Option<&StrategyState> {
        self.state.as_ref()
    }

    /// The write adapter.
    pub fn adapter(&self) -> &DeviceWriteAdapter {
        &self.adapter
    }

    /// Number of ticks run, skipped ones included.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl<D: MediaDevice + std::fmt::Debug> std::fmt::Debug for SyncController<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("device", &self.device)
            .field("strategy", &self.strategy)
            .field("state", &self.state)
            .field("ticks", &self.ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{DeviceStats, SimDevice, SimTimingObject, VirtualClock};
    use std::time::Duration;

    fn setup(duration: f64) -> (VirtualClock, SimDevice) {
        let clock = VirtualClock::starting_at(1.0);
        let device = SimDevice::new(&clock, duration);
        (clock, device)
    }

    fn controller(device: &SimDevice, strategy: UpdateStrategy) -> SyncController<SimDevice> {
        SyncController::new(device.clone(), strategy, SupportedRates::default())
    }

    #[test]
    fn test_first_tick_seeks_sets_rate_and_plays() {
        for strategy in [UpdateStrategy::Gradual, UpdateStrategy::Stepwise] {
            let (clock, device) = setup(100.0);
            let timing = SimTimingObject::with_vector(&clock, 5.0, 1.0);
            let mut controller = controller(&device, strategy);

            let outcome = controller.tick(&timing).unwrap();
            assert!(outcome.moving);
            assert_eq!(
                device.stats(),
                DeviceStats {
                    position_writes: 1,
                    rate_writes: 1,
                    play_calls: 1,
                    pause_calls: 0,
                    rejected_plays: 0,
                }
            );
            assert_eq!(device.position(), 5.0);
            assert!(!device.is_paused());
            assert!(!controller.device().is_paused());
            let memo = controller.adapter().memo(device.id()).copied().unwrap_or_default();
            assert_eq!(memo.position.map(|record| record.written), Some(5.0));

            device.reset_stats();
            let outcome = controller.tick(&timing).unwrap();
            assert!(outcome.moving);
            assert_eq!(device.stats().total_writes(), 0, "{} rewrote the device", strategy);
        }
    }

    #[test]
    fn test_no_writes_while_in_step() {
        let (clock, device) = setup(100.0);
        let timing = SimTimingObject::with_vector(&clock, 5.0, 1.0);
        let mut controller = controller(&device, UpdateStrategy::Gradual);
        controller.tick(&timing).unwrap();
        device.reset_stats();

        for _ in 0..10 {
            clock.advance(Duration::from_millis(100));
            controller.tick(&timing).unwrap();
        }
        assert_eq!(device.stats().total_writes(), 0);
        assert_eq!(controller.ticks(), 11);
    }

    #[test]
    fn test_negative_position_pauses_at_zero() {
        let (clock, device) = setup(100.0);
        device.configure(|m| {
            m.position = 3.0;
            m.paused = false;
        });
        let timing = SimTimingObject::with_vector(&clock, -1.0, 1.0);
        let mut controller = controller(&device, UpdateStrategy::Gradual);

        let outcome = controller.tick(&timing).unwrap();
        assert_eq!(device.position(), 0.0);
        assert!(device.is_paused());
        assert!(outcome.moving);

        // Already there: nothing more to write.
        device.reset_stats();
        controller.tick(&timing).unwrap();
        assert_eq!(device.stats().total_writes(), 0);
    }

    #[test]
    fn test_position_past_end_pauses_at_end() {
        let (clock, device) = setup(100.0);
        let timing = SimTimingObject::with_vector(&clock, 105.0, 1.0);
        let mut controller = controller(&device, UpdateStrategy::Gradual);

        controller.tick(&timing).unwrap();
        assert_eq!(device.position(), 100.0);
        assert!(device.is_paused());
        assert_eq!(device.stats().play_calls, 0);
    }

    #[test]
    fn test_out_of_bounds_position_snaps_at_any_velocity() {
        for strategy in [UpdateStrategy::Gradual, UpdateStrategy::Stepwise] {
            for (position, velocity, expected) in [(-1.0, -1.0, 0.0), (-1.0, 40.0, 0.0), (105.0, 20.0, 100.0)] {
                let (clock, device) = setup(100.0);
                device.configure(|m| {
                    m.position = 3.0;
                    m.paused = false;
                });
                let timing = SimTimingObject::with_vector(&clock, position, velocity);
                let mut controller = controller(&device, strategy);

                controller.tick(&timing).unwrap();
                assert_eq!(device.position(), expected, "{} at ({}, {})", strategy, position, velocity);
                assert!(device.is_paused(), "{} at ({}, {})", strategy, position, velocity);
                assert_eq!(device.stats().play_calls, 0);
            }
        }
    }

    #[test]
    fn test_unknown_duration_pauses_at_zero() {
        let (clock, device) = setup(f64::NAN);
        let timing = SimTimingObject::with_vector(&clock, 5.0, 1.0);
        let mut controller = controller(&device, UpdateStrategy::Stepwise);

        controller.tick(&timing).unwrap();
        assert_eq!(device.position(), 0.0);
        assert!(device.is_paused());
    }

    #[test]
    fn test_stopped_vector_pauses() {
        let (clock, device) = setup(100.0);
        let timing = SimTimingObject::with_vector(&clock, 5.0, 1.0);
        let mut controller = controller(&device, UpdateStrategy::Gradual);
        controller.tick(&timing).unwrap();

        timing.update(None, Some(0.0), None);
        let outcome = controller.tick(&timing).unwrap();
        assert!(!outcome.moving);
        assert!(device.is_paused());
        assert_eq!(device.stats().pause_calls, 1);
    }

    #[test]
    fn test_rejected_play_is_reported_and_retried() {
        let (clock, device) = setup(100.0);
        device.configure(|m| m.quirks.rejected_plays = 1);
        let timing = SimTimingObject::with_vector(&clock, 5.0, 1.0);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut controller = controller(&device, UpdateStrategy::Gradual).with_events(EventSink::new(tx));

        controller.tick(&timing).unwrap();
        assert!(device.is_paused());
        let rejected: Vec<_> = rx
            .try_iter()
            .filter_map(|event| match event {
                SyncEvent::PlayRejected { device: id, error } => Some((id, error)),
                _ => None,
            })
            .collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, device.id());
        assert!(matches!(rejected[0].1, SyncError::DeviceRejectedPlay(_)));

        controller.tick(&timing).unwrap();
        assert!(!device.is_paused());
        assert_eq!(device.stats().play_calls, 2);
        assert_eq!(device.stats().position_writes, 1);
        assert_eq!(device.stats().rate_writes, 1);
    }

    #[test]
    fn test_malformed_vector_skips_tick() {
        let (clock, device) = setup(100.0);
        let timing = SimTimingObject::with_vector(&clock, 5.0, 1.0);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut controller = controller(&device, UpdateStrategy::Stepwise).with_events(EventSink::new(tx));
        controller.tick(&timing).unwrap();
        let state = controller.state().copied();
        device.reset_stats();

        timing.set_anchor(TimingStateVector::moving(f64::NAN, 1.0, clock.now()));
        assert_eq!(controller.tick(&timing), Err(SyncError::MalformedTimingVector));
        assert_eq!(device.stats().total_writes(), 0);
        assert_eq!(controller.state().copied(), state);
        assert!(rx.try_iter().any(|event| event == SyncEvent::TickSkipped));
    }

    #[test]
    fn test_hooks_are_applied() {
        let (clock, device) = setup(100.0);
        let timing = SimTimingObject::with_vector(&clock, 5.0, 1.0);
        let mut controller = controller(&device, UpdateStrategy::Gradual)
            .with_vector_hook(Some(Box::new(|v: TimingStateVector| TimingStateVector {
                position: v.position + 10.0,
                ..v
            })))
            .with_update_hook(Some(Box::new(|u: UpdateVector| UpdateVector::new(u.position, u.velocity * 2.0))));

        let outcome = controller.tick(&timing).unwrap();
        assert_eq!(outcome.target, UpdateVector::new(15.0, 2.0));
        assert_eq!(device.position(), 15.0);
        assert_eq!(device.rate(), 2.0);
    }

    #[test]
    fn test_rate_is_clamped_to_supported_range() {
        let (clock, device) = setup(100.0);
        let timing = SimTimingObject::with_vector(&clock, 5.0, 1.0);
        let rates = SupportedRates::new(0.5, 2.0).unwrap();
        let mut controller = SyncController::new(device.clone(), UpdateStrategy::Stepwise, rates)
            .with_update_hook(Some(Box::new(|u: UpdateVector| UpdateVector::new(u.position, 8.0))));

        controller.tick(&timing).unwrap();
        assert_eq!(device.rate(), 2.0);
    }
}
