//! Runtime error types.

use ntbridge_core::BridgeError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while assembling or driving a bridge.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A bridged operation failed.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
