//! Precise re-application of the timing object's motion.
//!
//! Whenever the device drifts out of tolerance, the strategy latches the
//! timing object's current motion (plus a learned seek delay) and hands it to
//! the device verbatim. Right after such a re-synchronization some engines
//! briefly report a playhead that jumps backwards ("playhead reset") even
//! though playback is fine. While the device stays within
//! [`RESET_DISCREPANCY_BOUND`] of the latched position, readings that shrink
//! the distance are counted as resets and tolerated up to a budget that grows
//! each time it is exceeded.

use crate::strategy::{UpdateVector, POSITION_TOLERANCE};
use crate::vector::TimingStateVector;

/// Size of the window after a re-synchronization in which resets are tolerated.
pub const RESET_DISCREPANCY_BOUND: f64 = 0.5;

/// Memory of the stepwise strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepwiseState {
    pub last_applied_position: f64,
    pub last_applied_timestamp: f64,
    pub last_applied_velocity: f64,
    pub last_playhead_difference: f64,
    pub media_element_delay: f64,
    pub detected_resets: u32,
    pub expected_resets: u32,
}

impl Default for StepwiseState {
    fn default() -> Self {
        Self {
            last_applied_position: 0.0,
            last_applied_timestamp: 0.0,
            last_applied_velocity: 0.0,
            last_playhead_difference: 0.0,
            media_element_delay: 0.0,
            detected_resets: 0,
            expected_resets: 1,
        }
    }
}

impl StepwiseState {
    /// The motion that was last applied to the device.
    fn latched(&self) -> TimingStateVector {
        TimingStateVector::moving(
            self.last_applied_position,
            self.last_applied_velocity,
            self.last_applied_timestamp,
        )
    }

    /// Whether the timing object still follows the motion that was latched,
    /// i.e. it did not seek on its own since.
    fn follows_latched(&self, vector: &TimingStateVector) -> bool {
        let expected = self.latched().at(vector.timestamp).position - self.media_element_delay;
        (expected - vector.position).abs() < RESET_DISCREPANCY_BOUND
    }
}

/// One stepwise correction step.
///
/// Returns the target, the new state and whether the device is being
/// re-synchronized.
pub fn update(
    vector: &TimingStateVector,
    device_position: f64,
    state: StepwiseState,
) -> (UpdateVector, StepwiseState, bool) {
    let TimingStateVector {
        position,
        velocity,
        timestamp,
        ..
    } = *vector;
    let mut s = state;

    if position < 0.0 || velocity == 0.0 {
        s.last_applied_position = position;
        s.last_applied_velocity = velocity;
        s.last_applied_timestamp = timestamp;
        return (UpdateVector::new(position, velocity), s, false);
    }

    let mut budget_exceeded = false;

    if velocity == s.last_applied_velocity
        && s.last_playhead_difference < RESET_DISCREPANCY_BOUND
        && s.follows_latched(vector)
    {
        let discrepancy = (device_position - s.last_applied_position).abs() * s.last_applied_velocity.abs();

        if discrepancy < RESET_DISCREPANCY_BOUND {
            let shrinking = discrepancy < s.last_playhead_difference;
            s.last_playhead_difference = discrepancy;
            if shrinking {
                s.detected_resets += 1;
                log::trace!(
                    "Playhead reset {}/{} at {:.3}",
                    s.detected_resets,
                    s.expected_resets,
                    device_position
                );
            }
            if s.detected_resets <= s.expected_resets {
                return (UpdateVector::new(device_position, s.last_applied_velocity), s, false);
            }
            s.expected_resets += 1;
            budget_exceeded = true;
        } else {
            // Leaving the window. Resets seen in it were real artifacts.
            s.last_playhead_difference = discrepancy;
            if s.detected_resets > 0 {
                s.expected_resets += 1;
            }
        }
    }

    let error = (device_position - position).abs();
    if budget_exceeded || velocity != s.last_applied_velocity || error > POSITION_TOLERANCE {
        if s.last_applied_timestamp != 0.0 {
            let estimate = s.latched().at(timestamp);
            s.media_element_delay = estimate.position - device_position;
        }
        s.last_applied_position = position + s.media_element_delay;
        s.last_applied_velocity = velocity;
        s.last_applied_timestamp = timestamp;
        s.last_playhead_difference = 0.0;
        s.detected_resets = 0;

        log::debug!(
            "Stepwise resync to {:.3} at velocity {} (delay {:.3}, expected resets {})",
            s.last_applied_position,
            velocity,
            s.media_element_delay,
            s.expected_resets
        );
        return (UpdateVector::new(s.last_applied_position, velocity), s, true);
    }

    (UpdateVector::new(device_position, velocity), s, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = StepwiseState::default();
        assert_eq!(state.expected_resets, 1);
        assert_eq!(state.detected_resets, 0);
        assert_eq!(state.last_applied_timestamp, 0.0);
    }

    #[test]
    fn test_paused_vector_is_latched_verbatim() {
        let vector = TimingStateVector::moving(42.0, 0.0, 3.0);
        let (target, state, resync) = update(&vector, 10.0, StepwiseState::default());
        assert_eq!(target, UpdateVector::new(42.0, 0.0));
        assert_eq!(state.last_applied_position, 42.0);
        assert_eq!(state.last_applied_timestamp, 3.0);
        assert!(!resync);
    }

    #[test]
    fn test_first_motion_resyncs_without_delay() {
        let vector = TimingStateVector::moving(10.0, 1.0, 1.0);
        let (target, state, resync) = update(&vector, 0.0, StepwiseState::default());
        assert!(resync);
        assert_eq!(target, UpdateVector::new(10.0, 1.0));
        assert_eq!(state.media_element_delay, 0.0);
        assert_eq!(state.last_applied_velocity, 1.0);
    }

    #[test]
    fn test_drift_inside_window_is_ignored() {
        let vector = TimingStateVector::moving(10.0, 1.0, 1.0);
        let (_, state, _) = update(&vector, 0.0, StepwiseState::default());

        let later = vector.extrapolate(0.2);
        let (target, state, resync) = update(&later, 10.19, state);
        assert!(!resync);
        assert_eq!(target, UpdateVector::new(10.19, 1.0));
        assert!((state.last_playhead_difference - 0.19).abs() < 1e-9);
    }

    #[test]
    fn test_resync_learns_device_lag() {
        let vector = TimingStateVector::moving(10.0, 1.0, 1.0);
        let (_, state, _) = update(&vector, 0.0, StepwiseState::default());

        // One second later the device only advanced 0.7 seconds and the
        // velocity changes: the 0.3 seconds of lag become the delay.
        let changed = TimingStateVector::moving(11.0, 2.0, 2.0);
        let (target, state, resync) = update(&changed, 10.7, state);
        assert!(resync);
        assert!((state.media_element_delay - 0.3).abs() < 1e-9);
        assert!((target.position - 11.3).abs() < 1e-9);
        assert_eq!(target.velocity, 2.0);
    }

    #[test]
    fn test_out_of_tolerance_after_window_resyncs() {
        let vector = TimingStateVector::moving(10.0, 1.0, 1.0);
        let (_, mut state, _) = update(&vector, 0.0, StepwiseState::default());

        // Close the window with a reading beyond the bound.
        let later = vector.extrapolate(0.6);
        let (_, next, resync) = update(&later, 10.6, state);
        assert!(!resync);
        assert!(next.last_playhead_difference >= RESET_DISCREPANCY_BOUND);
        assert_eq!(next.expected_resets, 1);
        state = next;

        // Now drift by 0.1: the window is closed, so tolerance decides.
        let later = vector.extrapolate(1.0);
        let (_, _, resync) = update(&later, 10.9, state);
        assert!(resync);
    }

    #[test]
    fn test_reset_budget_bounds_resyncs_per_window() {
        // A constant target with the device oscillating 0.2/0.1 ahead of it,
        // which reads as a playhead reset every second tick.
        let vector = TimingStateVector::moving(10.0, 1.0, 1.0);
        let (_, mut state, resync) = update(&vector, 0.0, StepwiseState::default());
        assert!(resync);

        let oscillation = [10.2, 10.1];
        let mut resyncs_per_window = Vec::new();
        let mut resets_tolerated = 0;
        let mut budget_at_window_start = state.expected_resets;

        for tick in 0..12 {
            let device_position = oscillation[tick % 2];
            let (_, next, resync) = update(&vector, device_position, state);
            if resync {
                resyncs_per_window.push((budget_at_window_start, resets_tolerated));
                resets_tolerated = 0;
                budget_at_window_start = next.expected_resets;
            } else if next.detected_resets > state.detected_resets {
                resets_tolerated += 1;
            }
            assert!(next.detected_resets <= next.expected_resets);
            state = next;
        }

        // Each window tolerated exactly its budget before re-synchronizing
        // once, and the budget grew by one.
        assert_eq!(resyncs_per_window, vec![(1, 1), (2, 2)]);
        assert_eq!(state.expected_resets, 3);
    }

    #[test]
    fn test_backward_seek_from_timing_object_resyncs_immediately() {
        let vector = TimingStateVector::moving(20.0, 1.0, 1.0);
        let (_, state, _) = update(&vector, 0.0, StepwiseState::default());

        // Device follows perfectly for a moment.
        let (_, state, resync) = update(&vector.extrapolate(0.1), 20.1, state);
        assert!(!resync);

        // The timing object itself seeks back to 5 at unchanged velocity.
        let seeked = TimingStateVector::moving(5.0, 1.0, 1.2);
        let (target, state, resync) = update(&seeked, 20.2, state);
        assert!(resync);
        assert_eq!(state.detected_resets, 0);
        assert!((target.position - (5.0 + state.media_element_delay)).abs() < 1e-9);
        assert!(target.position < 6.0);
    }

    #[test]
    fn test_negative_position_latched() {
        let vector = TimingStateVector::moving(-1.0, 1.0, 1.0);
        let (target, state, resync) = update(&vector, 4.0, StepwiseState::default());
        assert_eq!(target, UpdateVector::new(-1.0, 1.0));
        assert_eq!(state.last_applied_position, -1.0);
        assert!(!resync);
    }
}
