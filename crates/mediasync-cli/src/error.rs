//! Error types for mediasync scenario files

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for scenario configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading or saving a scenario
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No scenario file at the expected location
    #[error("Scenario file not found at {0}")]
    NotFound(PathBuf),

    /// The platform has no configuration directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// The scenario parsed but describes something impossible
    #[error("Invalid scenario: {0}")]
    Invalid(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
