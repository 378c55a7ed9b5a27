//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file extension is unknown or its format feature is disabled.
    #[error("Unsupported or disabled configuration file format: .{0}")]
    UnsupportedFormat(String),

    /// The merged sources could not be extracted into the schema.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    ValidationError { message: String },

    /// Missing required field.
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },
}

impl ConfigError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::ParseError(e.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
