//! Scenario file support for mediasync
//!
//! A scenario describes one simulated session: the strategy, the simulated
//! device and its quirks, the timing object's motion over time, and the host's
//! frame rate and visibility. It is stored in TOML format at:
//! - Linux: `~/.config/mediasync/scenario.toml`
//! - macOS: `~/Library/Application Support/mediasync/scenario.toml`
//! - Windows: `%APPDATA%\mediasync\scenario.toml`

use crate::error::{ConfigError, Result};
use directories::ProjectDirs;
use mediasync_core::sim::DeviceQuirks;
use mediasync_core::{SupportedRates, TimingStateVector, UpdateStrategy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest simulated run a scenario may ask for (one day).
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Main scenario structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Session settings
    pub session: SessionSettings,
    /// Timing object motion
    pub timing: TimingSettings,
    /// Simulated media device
    pub device: DeviceSettings,
    /// Simulated host
    pub host: HostSettings,
}

impl Scenario {
    /// Load the scenario from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load a scenario from `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let scenario: Scenario = toml::from_str(&content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load the scenario or return the default if there is none
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(scenario) => scenario,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(err) => {
                log::warn!("Ignoring scenario file: {}", err);
                Self::default()
            }
        }
    }

    /// Save the scenario to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save the scenario to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default scenario file path
    pub fn config_path() -> Result<PathBuf> {
        ProjectDirs::from("", "", "mediasync")
            .map(|dirs| dirs.config_dir().join("scenario.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Create a default scenario file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        Self::write_default_config_file(&path)?;
        Ok(path)
    }

    fn write_default_config_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = r#"# mediasync scenario file

[session]
# Correction strategy: "gradual" or "stepwise"
strategy = "gradual"

# Playback rates the device supports
min_rate = 0.0625
max_rate = 16.0

# Probe the simulated device for its rate range instead
detect_rates = false

# Simulated run time in seconds
duration_secs = 10.0

[timing]
# Initial motion of the timing object
position = 10.0
velocity = 1.0
acceleration = 0.0

# Scripted motion changes (unset fields keep their current value)
# [[timing.changes]]
# at_secs = 5.0
# velocity = 2.0

[device]
# Media duration in seconds
duration = 300.0

# Initial playhead position
position = 0.0

# Engine quirks
# position_precision = 0.001
# unity_dead_zone = 0.005
# playhead_reset = 0.2
rejected_plays = 0
min_rate = 0.0625
max_rate = 16.0

[host]
# Display refresh interval in milliseconds
frame_ms = 16

# Whether the host starts visible
visible = true

# Hide the host for part of the run
# hidden_from_secs = 4.0
# hidden_until_secs = 6.0
"#;

        fs::write(path, content)?;
        Ok(())
    }

    /// Reject scenarios that cannot be simulated
    pub fn validate(&self) -> Result<()> {
        self.rates()
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if !(0.0..=MAX_DURATION_SECS).contains(&self.session.duration_secs) {
            return Err(ConfigError::Invalid(format!(
                "duration_secs must be between 0 and {}, got {}",
                MAX_DURATION_SECS, self.session.duration_secs
            )));
        }
        if self.host.frame_ms == 0 {
            return Err(ConfigError::Invalid("frame_ms must be positive".to_string()));
        }
        if !self.timing.initial_vector(0.0).is_finite() {
            return Err(ConfigError::Invalid("timing vector must be finite".to_string()));
        }
        if self.timing.changes.iter().any(|change| !change.at_secs.is_finite()) {
            return Err(ConfigError::Invalid("timing change times must be finite".to_string()));
        }
        Ok(())
    }

    /// Configured rate range
    pub fn rates(&self) -> SupportedRates {
        SupportedRates {
            min: self.session.min_rate,
            max: self.session.max_rate,
        }
    }
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub strategy: UpdateStrategy,
    pub min_rate: f64,
    pub max_rate: f64,
    pub detect_rates: bool,
    pub duration_secs: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let rates = SupportedRates::default();
        Self {
            strategy: UpdateStrategy::default(),
            min_rate: rates.min,
            max_rate: rates.max,
            detect_rates: false,
            duration_secs: 10.0,
        }
    }
}

/// Timing object motion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub position: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub changes: Vec<TimingChange>,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            position: 10.0,
            velocity: 1.0,
            acceleration: 0.0,
            changes: Vec::new(),
        }
    }
}

impl TimingSettings {
    /// The initial vector, anchored at `timestamp`
    pub fn initial_vector(&self, timestamp: f64) -> TimingStateVector {
        TimingStateVector::new(self.position, self.velocity, self.acceleration, timestamp)
    }

    /// Scripted changes ordered by time
    pub fn sorted_changes(&self) -> Vec<TimingChange> {
        let mut changes = self.changes.clone();
        changes.sort_by(|a, b| a.at_secs.total_cmp(&b.at_secs));
        changes
    }
}

/// One scripted change of the timing object's motion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingChange {
    /// Seconds after the start of the run
    pub at_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<f64>,
}

/// Simulated media device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub duration: f64,
    pub position: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_precision: Option<f64>,
    pub rejected_plays: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unity_dead_zone: Option<f64>,
    pub min_rate: f64,
    pub max_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playhead_reset: Option<f64>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        let quirks = DeviceQuirks::default();
        Self {
            duration: 300.0,
            position: 0.0,
            position_precision: quirks.position_precision,
            rejected_plays: quirks.rejected_plays,
            unity_dead_zone: quirks.unity_dead_zone,
            min_rate: quirks.min_rate,
            max_rate: quirks.max_rate,
            playhead_reset: quirks.playhead_reset,
        }
    }
}

impl DeviceSettings {
    /// Engine quirks for the simulated device
    pub fn quirks(&self) -> DeviceQuirks {
        DeviceQuirks {
            position_precision: self.position_precision,
            rejected_plays: self.rejected_plays,
            unity_dead_zone: self.unity_dead_zone,
            min_rate: self.min_rate,
            max_rate: self.max_rate,
            playhead_reset: self.playhead_reset,
        }
    }
}

/// Simulated host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub frame_ms: u64,
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_from_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_until_secs: Option<f64>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            frame_ms: 16,
            visible: true,
            hidden_from_secs: None,
            hidden_until_secs: None,
        }
    }
}

impl HostSettings {
    /// Display refresh interval
    pub fn frame(&self) -> Duration {
        Duration::from_millis(self.frame_ms)
    }

    /// Whether the host is visible `elapsed` seconds into the run
    pub fn visible_at(&self, elapsed: f64) -> bool {
        let hidden = match (self.hidden_from_secs, self.hidden_until_secs) {
            (Some(from), Some(until)) => elapsed >= from && elapsed < until,
            (Some(from), None) => elapsed >= from,
            (None, Some(until)) => elapsed < until,
            (None, None) => false,
        };
        self.visible && !hidden
    }
}
