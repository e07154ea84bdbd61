//! mediasync-cli - Simulated synchronization sessions for mediasync
//!
//! Runs the mediasync control loop against the simulated device, timing object
//! and host of `mediasync_core::sim`, driven by a TOML scenario:
//!
//! - Scenario files with session, timing, device and host sections
//! - Scripted timing object changes and host visibility windows
//! - Optional rate probing of the simulated device
//! - A run summary with tick, write and event counts and the final drift
//!
//! # Usage as a Library
//!
//! ```
//! use mediasync_cli::{run_scenario, Scenario};
//!
//! let mut scenario = Scenario::default();
//! scenario.session.duration_secs = 1.0;
//! let summary = run_scenario(&scenario).unwrap();
//! assert!(summary.drift() < 0.025);
//! ```

pub mod config;
pub mod error;
pub mod run;

// Re-export main types
pub use config::{DeviceSettings, HostSettings, Scenario, SessionSettings, TimingChange, TimingSettings};
pub use error::{ConfigError, Result};
pub use run::{run_scenario, EventCounts, RunSummary};
