//! Correction strategies.
//!
//! A strategy looks at the timing object's vector and the device's reported
//! position and decides which position and velocity the device should have.
//! Strategies are pure: all memory they need between ticks lives in a
//! [`StrategyState`] that the controller threads from one tick to the next.
//!
//! - [`UpdateStrategy::Gradual`] steers the playback rate so the device glides
//!   back onto the timing object, and only seeks on large errors.
//! - [`UpdateStrategy::Stepwise`] re-applies the timing object's motion
//!   precisely whenever the device drifts out of tolerance, and tolerates a
//!   known "playhead reset" artifact of some engines.

pub mod gradual;
pub mod stepwise;

use serde::{Deserialize, Serialize};

use crate::rates::SupportedRates;
use crate::vector::TimingStateVector;

pub use gradual::GradualState;
pub use stepwise::StepwiseState;

/// Errors below this are not corrected.
pub const POSITION_TOLERANCE: f64 = 0.025;

/// Position and velocity a strategy wants the device to have.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateVector {
    pub position: f64,
    pub velocity: f64,
}

impl UpdateVector {
    pub const fn new(position: f64, velocity: f64) -> Self {
        Self { position, velocity }
    }
}

/// Private memory of a strategy between ticks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StrategyState {
    Gradual(GradualState),
    Stepwise(StepwiseState),
}

impl StrategyState {
    /// Seek latency currently compensated for.
    pub fn media_element_delay(&self) -> f64 {
        match self {
            StrategyState::Gradual(state) => state.media_element_delay,
            StrategyState::Stepwise(state) => state.media_element_delay,
        }
    }
}

/// Result of one strategy invocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrategyOutput {
    pub target: UpdateVector,
    pub state: StrategyState,
    /// Whether the strategy re-targeted the device position.
    pub resynchronized: bool,
}

/// The correction strategy of a session, chosen once at construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStrategy {
    #[default]
    Gradual,
    Stepwise,
}

impl UpdateStrategy {
    /// State used on the first tick.
    pub fn initial_state(&self) -> StrategyState {
        match self {
            UpdateStrategy::Gradual => StrategyState::Gradual(GradualState::default()),
            UpdateStrategy::Stepwise => StrategyState::Stepwise(StepwiseState::default()),
        }
    }

    /// Compute the next target for the device.
    ///
    /// `state` is the state returned by the previous invocation, or `None` on
    /// the first tick. A state of the other strategy's kind is ignored.
    pub fn update(
        &self,
        vector: &TimingStateVector,
        device_position: f64,
        state: Option<StrategyState>,
        rates: &SupportedRates,
    ) -> StrategyOutput {
        match self {
            UpdateStrategy::Gradual => {
                let prior = match state {
                    Some(StrategyState::Gradual(state)) => state,
                    _ => GradualState::default(),
                };
                let (target, state, resynchronized) = gradual::update(vector, device_position, prior, rates);
                StrategyOutput {
                    target,
                    state: StrategyState::Gradual(state),
                    resynchronized,
                }
            }
            UpdateStrategy::Stepwise => {
                let prior = match state {
                    Some(StrategyState::Stepwise(state)) => state,
                    _ => StepwiseState::default(),
                };
                let (target, state, resynchronized) = stepwise::update(vector, device_position, prior);
                StrategyOutput {
                    target,
                    state: StrategyState::Stepwise(state),
                    resynchronized,
                }
            }
        }
    }
}

impl std::fmt::Display for UpdateStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateStrategy::Gradual => write!(f, "gradual"),
            UpdateStrategy::Stepwise => write!(f, "stepwise"),
        }
    }
}

impl std::str::FromStr for UpdateStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gradual" => Ok(UpdateStrategy::Gradual),
            "stepwise" => Ok(UpdateStrategy::Stepwise),
            other => Err(format!("unknown update strategy '{}'", other)),
        }
    }
}
