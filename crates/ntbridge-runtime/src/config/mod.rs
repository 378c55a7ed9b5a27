//! Configuration for the bridge runtime.
//!
//! Layered loading (defaults, file, environment) and validation of the
//! correlation, group and logging settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ENV_PREFIX, load_config, load_config_from_file};
pub use schema::{
    BridgeConfig, CorrelationConfig, GroupConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
