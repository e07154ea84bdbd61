//! Timing state vectors and kinematic extrapolation.
//!
//! A [`TimingStateVector`] is the snapshot a timing object hands out on every
//! query. The control loop never keeps one beyond the tick that read it, except
//! for the Stepwise strategy which latches the values it applied and rebuilds a
//! vector from them later.

use serde::{Deserialize, Serialize};

/// Immutable motion snapshot reported by a timing object.
///
/// `timestamp` is in seconds on the timing object's own clock. Position and
/// velocity are in media seconds and media seconds per second.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingStateVector {
    pub position: f64,
    pub velocity: f64,
    #[serde(default)]
    pub acceleration: f64,
    #[serde(default)]
    pub timestamp: f64,
}

impl Default for TimingStateVector {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

impl TimingStateVector {
    /// Create a vector from its four components.
    pub const fn new(position: f64, velocity: f64, acceleration: f64, timestamp: f64) -> Self {
        Self {
            position,
            velocity,
            acceleration,
            timestamp,
        }
    }

    /// Create a vector with no acceleration.
    pub const fn moving(position: f64, velocity: f64, timestamp: f64) -> Self {
        Self::new(position, velocity, 0.0, timestamp)
    }

    /// Project this vector `dt` seconds forward (or backward for negative `dt`)
    /// under constant acceleration.
    pub fn extrapolate(&self, dt: f64) -> Self {
        Self {
            position: self.position + self.velocity * dt + 0.5 * self.acceleration * dt * dt,
            velocity: self.velocity + self.acceleration * dt,
            acceleration: self.acceleration,
            timestamp: self.timestamp + dt,
        }
    }

    /// Project this vector to an absolute timestamp.
    pub fn at(&self, timestamp: f64) -> Self {
        self.extrapolate(timestamp - self.timestamp)
    }

    /// Whether every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.acceleration.is_finite()
            && self.timestamp.is_finite()
    }
}
