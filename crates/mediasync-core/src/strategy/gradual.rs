//! Rate-steering correction.
//!
//! Small errors are corrected by nudging the playback rate; errors beyond the
//! hysteresis threshold are corrected by seeking, and any lag the device shows
//! after such a seek is absorbed into a standing `media_element_delay` that is
//! added to subsequent seek targets.

use crate::rates::SupportedRates;
use crate::strategy::{UpdateVector, POSITION_TOLERANCE};
use crate::vector::TimingStateVector;

/// Errors above this are corrected by seeking instead of steering.
pub const HYSTERESIS_THRESHOLD: f64 = 1.0;

/// How strongly the rate reacts to a position error.
pub const CONVERGENCE_GAIN: f64 = 1.0;

/// Memory of the gradual strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GradualState {
    /// Offset added to seek targets to compensate device lag.
    pub media_element_delay: f64,
    /// Device position seen on the previous tick.
    pub last_device_position: Option<f64>,
}

/// Rate that moves a device `diff` seconds off target back towards it.
///
/// A device ahead of the target (`diff > 0`) is slowed down, one behind it is
/// sped up, by a factor that grows exponentially with the error. The result
/// stays within `[min_rate, max_rate]`.
pub fn converge(diff: f64, min_rate: f64, max_rate: f64, velocity: f64) -> f64 {
    let factor = (diff.abs() * CONVERGENCE_GAIN).exp();
    let corrected = if diff > 0.0 {
        velocity / factor
    } else {
        velocity * factor
    };
    corrected.max(min_rate).min(max_rate)
}

/// One gradual correction step.
///
/// Returns the target, the new state and whether the device is being
/// re-targeted by a seek.
pub fn update(
    vector: &TimingStateVector,
    device_position: f64,
    state: GradualState,
    rates: &SupportedRates,
) -> (UpdateVector, GradualState, bool) {
    let TimingStateVector { position, velocity, .. } = *vector;
    let mut next = GradualState {
        last_device_position: Some(device_position),
        ..state
    };

    // Never hand the device a rate it cannot play; stop it on the target.
    if velocity != 0.0 && !rates.contains(velocity) {
        return (UpdateVector::new(position, 0.0), next, false);
    }

    if position < 0.0 || velocity == 0.0 {
        return (UpdateVector::new(position, velocity), next, false);
    }

    let diff = device_position - position;
    let distance = diff.abs();

    if distance > HYSTERESIS_THRESHOLD {
        // Lag can only be judged against an earlier observation.
        if let Some(last_position) = state.last_device_position {
            let moved = last_position != device_position;
            let lagging = diff < 0.0 && (distance > state.media_element_delay || !moved);

            if lagging {
                next.media_element_delay += distance;
            } else if moved {
                next.media_element_delay = (state.media_element_delay - distance).max(0.0);
            } else {
                // A seek is still settling.
                return (UpdateVector::new(device_position, velocity), next, false);
            }
        }

        log::debug!(
            "Gradual re-target: device {:.3}, target {:.3}, delay {:.3}",
            device_position,
            position,
            next.media_element_delay
        );
        return (
            UpdateVector::new(position + next.media_element_delay, velocity),
            next,
            true,
        );
    }

    if distance > POSITION_TOLERANCE {
        let corrected = converge(diff, rates.min, rates.max, velocity);
        return (UpdateVector::new(device_position, corrected), next, false);
    }

    (UpdateVector::new(device_position, velocity), next, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> SupportedRates {
        SupportedRates::default()
    }

    #[test]
    fn test_out_of_range_velocity_freezes() {
        let rates = rates();
        let state = GradualState {
            media_element_delay: 0.4,
            last_device_position: None,
        };
        for velocity in [-1.0, 0.01, 16.5, 100.0] {
            for device_position in [0.0, 3.0, 42.5] {
                let vector = TimingStateVector::moving(10.0, velocity, 0.0);
                let (target, next, resync) = update(&vector, device_position, state, &rates);
                assert_eq!(target, UpdateVector::new(10.0, 0.0));
                assert!((next.media_element_delay - 0.4).abs() < 1e-12);
                assert!(!resync);
            }
        }
    }

    #[test]
    fn test_negative_position_and_zero_velocity_pass_through() {
        let rates = rates();
        let (target, _, _) = update(&TimingStateVector::moving(-1.0, 1.0, 0.0), 3.0, GradualState::default(), &rates);
        assert_eq!(target, UpdateVector::new(-1.0, 1.0));

        let (target, _, _) = update(&TimingStateVector::moving(7.0, 0.0, 0.0), 3.0, GradualState::default(), &rates);
        assert_eq!(target, UpdateVector::new(7.0, 0.0));
    }

    #[test]
    fn test_accepts_small_error() {
        let rates = rates();
        let vector = TimingStateVector::moving(10.0, 1.0, 0.0);
        let (target, _, _) = update(&vector, 10.01, GradualState::default(), &rates);
        assert_eq!(target, UpdateVector::new(10.01, 1.0));
    }

    #[test]
    fn test_steers_rate_within_hysteresis() {
        let rates = rates();
        let vector = TimingStateVector::moving(10.0, 1.0, 0.0);

        let (ahead, _, _) = update(&vector, 10.5, GradualState::default(), &rates);
        assert_eq!(ahead.position, 10.5);
        assert!(ahead.velocity < 1.0);

        let (behind, _, _) = update(&vector, 9.5, GradualState::default(), &rates);
        assert_eq!(behind.position, 9.5);
        assert!(behind.velocity > 1.0);
    }

    #[test]
    fn test_converge_is_bounded() {
        assert!((converge(0.9, 0.9, 1.1, 1.0) - 0.9).abs() < 1e-12);
        assert!((converge(-0.9, 0.9, 1.1, 1.0) - 1.1).abs() < 1e-12);
        assert!((converge(0.0, 0.0625, 16.0, 2.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_first_tick_seeks_without_learning() {
        let rates = rates();
        let vector = TimingStateVector::moving(5.0, 1.0, 0.0);
        let (target, state, resync) = update(&vector, 0.0, GradualState::default(), &rates);
        assert!(resync);
        assert_eq!(target, UpdateVector::new(5.0, 1.0));
        assert_eq!(state.media_element_delay, 0.0);
        assert_eq!(state.last_device_position, Some(0.0));
    }

    #[test]
    fn test_lag_grows_delay_then_shrinks() {
        let rates = rates();
        let vector = TimingStateVector::moving(10.0, 1.0, 0.0);
        let seeded = GradualState {
            media_element_delay: 0.0,
            last_device_position: Some(0.0),
        };

        let (target, state, resync) = update(&vector, 7.0, seeded, &rates);
        assert!(resync);
        assert!((state.media_element_delay - 3.0).abs() < 1e-12);
        assert!((target.position - 13.0).abs() < 1e-12);

        // The seek overshot: the device moved and is now ahead.
        let (target, state, resync) = update(&vector, 12.0, state, &rates);
        assert!(resync);
        assert!((state.media_element_delay - 1.0).abs() < 1e-12);
        assert!((target.position - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_stationary_device_behind_grows_delay() {
        let rates = rates();
        let vector = TimingStateVector::moving(10.0, 1.0, 0.0);
        let state = GradualState {
            media_element_delay: 5.0,
            last_device_position: Some(7.0),
        };
        // Behind by less than the delay, but stuck since the last tick.
        let (target, next, resync) = update(&vector, 7.0, state, &rates);
        assert!(resync);
        assert!((next.media_element_delay - 8.0).abs() < 1e-12);
        assert!((target.position - 18.0).abs() < 1e-12);
        assert_eq!(target.velocity, 1.0);
        assert_eq!(next.last_device_position, Some(7.0));
    }

    #[test]
    fn test_holds_while_seek_settles() {
        let rates = rates();
        let vector = TimingStateVector::moving(10.0, 1.0, 0.0);
        let state = GradualState {
            media_element_delay: 0.0,
            last_device_position: Some(14.0),
        };
        // Ahead and not moving: nothing to learn yet.
        let (target, next, resync) = update(&vector, 14.0, state, &rates);
        assert_eq!(target, UpdateVector::new(14.0, 1.0));
        assert_eq!(next.media_element_delay, 0.0);
        assert!(!resync);
    }

    #[test]
    fn test_converges_when_output_is_fed_back() {
        let rates = rates();
        let vector = TimingStateVector::moving(10.0, 1.0, 0.0);
        let mut device_position: f64 = 0.0;
        let mut state = GradualState::default();

        let mut ticks = 0;
        while (device_position - 10.0).abs() > POSITION_TOLERANCE {
            let (target, next, _) = update(&vector, device_position, state, &rates);
            device_position = target.position;
            state = next;
            ticks += 1;
            assert!(ticks <= 10, "did not converge");
        }
    }

    #[test]
    fn test_converges_while_time_advances() {
        let rates = rates();
        let dt: f64 = 0.1;
        let mut vector = TimingStateVector::moving(10.0, 1.0, 0.0);
        let mut device_position: f64 = 10.5;
        let mut state = GradualState::default();

        let mut ticks = 0;
        loop {
            let (target, next, _) = update(&vector, device_position, state, &rates);
            if (device_position - vector.position).abs() <= POSITION_TOLERANCE {
                break;
            }
            state = next;
            device_position = target.position + target.velocity * dt;
            vector = vector.extrapolate(dt);
            ticks += 1;
            assert!(ticks <= 200, "did not converge");
        }
    }
}
