//! Core error types for the Canopy pipeline.
//!
//! This module defines the central error type used across all subsystems.
//! Per-item and per-strategy failures are not errors at this level: they are
//! reported as [`AdapterOutcome`](crate::run::AdapterOutcome) values.

use thiserror::Error;

/// Central error type for Canopy operations.
#[derive(Error, Debug)]
pub enum CanopyError {
    /// Configuration errors (file loading, parsing, validation)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Target is not present in the registry
    #[error("target not found: {target_id}")]
    TargetNotFound {
        /// Identifier that was looked up
        target_id: String,
    },

    /// Target registry file could not be parsed
    #[error("invalid target registry: {0}")]
    Registry(String),

    /// Validation errors (invalid identifiers, constraints)
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// I/O error reading/writing config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias using `CanopyError`.
pub type Result<T> = std::result::Result<T, CanopyError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CanopyError::TargetNotFound {
            target_id: "green-leaf".to_string(),
        };
        assert_eq!(err.to_string(), "target not found: green-leaf");

        let err = ConfigError::InvalidValue {
            field: "scraping.max_concurrent_runs".to_string(),
            reason: "must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config value for scraping.max_concurrent_runs: must be at least 1"
        );
    }

    #[test]
    fn test_error_from_config() {
        let canopy_err: CanopyError = ConfigError::NoConfigDir.into();
        assert!(matches!(canopy_err, CanopyError::Config(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let canopy_err: CanopyError = io_err.into();
        assert!(matches!(canopy_err, CanopyError::Io(_)));
    }
}
