//! Error types for harness configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, validating or writing configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific file
    #[error("failed to write {path}: {source}")]
    Write {
        /// File that could not be written
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
