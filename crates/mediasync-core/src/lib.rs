//! mediasync-core - Lock a media playback device to an external timing object.
//!
//! A timing object reports motion (position, velocity, acceleration) on its
//! own clock. This crate keeps a media device's playhead on that motion,
//! despite devices that quantize positions, ignore some rates, refuse to play
//! or glitch after a seek.
//!
//! - **Vector** - Timing state vectors and kinematic extrapolation
//! - **Adapter** - Deduplicating device writes
//! - **Strategy** - Gradual (rate steering) and Stepwise (re-application) correction
//! - **Controller** - One synchronization tick and the device transition policy
//! - **Scheduler** - Idle/polling tick scheduling and session lifecycle
//! - **Sim** - Virtual-clock device, timing object and host for tests and demos
//!
//! # Architecture
//!
//! The caller supplies the three collaborators as traits: a [`MediaDevice`], a
//! [`TimingObject`] and a [`Host`] providing repaint callbacks, recurring
//! timers and visibility. [`start_synchronization`] runs the first tick and
//! returns a [`Disposer`]; from then on the host's triggers drive the
//! session. Everything runs on one thread.
//!
//! # Usage
//!
//! ```
//! use mediasync_core::sim::{ManualHost, SimDevice, SimTimingObject, VirtualClock};
//! use mediasync_core::{start_synchronization, SyncOptions, UpdateStrategy};
//! use std::time::Duration;
//!
//! let clock = VirtualClock::new();
//! let device = SimDevice::new(&clock, 100.0);
//! let timing = SimTimingObject::with_vector(&clock, 5.0, 1.0);
//! let host = ManualHost::new(&clock);
//!
//! let options = SyncOptions::new().strategy(UpdateStrategy::Stepwise);
//! let mut disposer = start_synchronization(device.clone(), timing, host.clone(), options).unwrap();
//!
//! host.run_for(Duration::from_secs(1), Duration::from_millis(16));
//! disposer.dispose();
//! ```

pub mod adapter;
pub mod controller;
pub mod device;
pub mod error;
pub mod events;
pub mod host;
pub mod rates;
pub mod scheduler;
pub mod sim;
pub mod strategy;
pub mod timing_object;
pub mod vector;

// Re-export main types
pub use adapter::{DeviceWriteAdapter, WriteMemo, WriteRecord, POSITION_EPSILON};
pub use controller::{SyncController, TickOutcome, UpdateHook, VectorHook};
pub use device::{DeviceId, DeviceSample, MediaDevice, PlayError};
pub use error::{Result, SyncError};
pub use events::{EventSink, SyncEvent};
pub use host::{Host, HostCapabilities, Subscription, SubscriptionSet};
pub use rates::SupportedRates;
pub use scheduler::{start_synchronization, Disposer, Mode, SyncOptions, POLL_INTERVAL};
pub use strategy::{StrategyState, UpdateStrategy, UpdateVector, POSITION_TOLERANCE};
pub use timing_object::TimingObject;
pub use vector::TimingStateVector;
