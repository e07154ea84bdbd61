//! Error types for the mediasync-core crate.

use thiserror::Error;

use crate::device::PlayError;

/// Errors surfaced by a synchronization session.
///
/// Only [`SyncError::UnsupportedCapability`] and [`SyncError::InvalidRates`]
/// ever reach the caller of [`start_synchronization`](crate::start_synchronization).
/// The other variants describe conditions the running loop absorbs: they are
/// logged and forwarded on the event side channel, and the session keeps
/// ticking.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The host is missing a scheduling primitive the scheduler needs.
    #[error("Host does not support {0}")]
    UnsupportedCapability(&'static str),

    /// The configured playback-rate range is empty or not finite.
    #[error("Invalid supported rate range [{min}, {max}]")]
    InvalidRates { min: f64, max: f64 },

    /// The timing object produced a vector with a non-finite component.
    #[error("Timing object returned a malformed state vector")]
    MalformedTimingVector,

    /// The media engine refused a programmatic play().
    #[error("Device rejected play: {0}")]
    DeviceRejectedPlay(#[from] PlayError),
}

/// Result type alias using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;
