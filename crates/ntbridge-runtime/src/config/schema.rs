//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ntbridge_core::DEFAULT_TIMEOUT;
use ntbridge_group::{DEFAULT_ALL_INFO_TIMEOUT, DEFAULT_MEMBER_FETCH_SIZE, GroupOptions};

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Correlation engine settings.
    #[serde(default)]
    pub correlation: CorrelationConfig,

    /// Group operation settings.
    #[serde(default)]
    pub group: GroupConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Correlation
// =============================================================================

/// Correlation engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Window for correlations that do not set their own, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Buffer size of the built-in command channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl CorrelationConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_channel_capacity() -> usize {
    256
}

// =============================================================================
// Group
// =============================================================================

/// Group operation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Members requested per full member-list fetch.
    #[serde(default = "default_member_fetch_size")]
    pub member_fetch_size: u32,

    /// Default window for group detail lookups, in milliseconds.
    #[serde(default = "default_all_info_timeout_ms")]
    pub all_info_timeout_ms: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            member_fetch_size: default_member_fetch_size(),
            all_info_timeout_ms: default_all_info_timeout_ms(),
        }
    }
}

impl GroupConfig {
    /// Converts to the group API options.
    pub fn to_options(&self) -> GroupOptions {
        GroupOptions {
            member_fetch_size: self.member_fetch_size,
            all_info_timeout: Duration::from_millis(self.all_info_timeout_ms),
        }
    }
}

fn default_member_fetch_size() -> u32 {
    DEFAULT_MEMBER_FETCH_SIZE
}

fn default_all_info_timeout_ms() -> u64 {
    DEFAULT_ALL_INFO_TIMEOUT.as_millis() as u64
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Write to `file_path`.
    File,
}

/// How often the log file is rolled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Global level.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file path, required when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread ids in each line.
    #[serde(default)]
    pub thread_ids: bool,

    /// Per-target level overrides, e.g. `ntbridge_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    #[serde(default)]
    pub span_events: SpanEventConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();

        assert_eq!(config.correlation.default_timeout(), Duration::from_millis(5000));
        assert_eq!(config.correlation.channel_capacity, 256);
        assert_eq!(config.group.member_fetch_size, 3000);
        assert_eq!(
            config.group.to_options().all_info_timeout,
            Duration::from_millis(1000)
        );
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
correlation:
  default_timeout_ms: 2500
group:
  member_fetch_size: 500
logging:
  level: debug
  output: file
  file_path: logs/ntbridge.log
  rotation: daily
  filters:
    ntbridge_core: trace
"#;

        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.correlation.default_timeout_ms, 2500);
        assert_eq!(config.correlation.channel_capacity, 256);
        assert_eq!(config.group.member_fetch_size, 500);
        assert_eq!(config.group.all_info_timeout_ms, 1000);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.output, LogOutput::File);
        assert_eq!(config.logging.rotation, LogRotation::Daily);
        assert_eq!(
            config.logging.filters.get("ntbridge_core"),
            Some(&LogLevel::Trace)
        );
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        let yaml = "logging:\n  level: loud\n";
        assert!(serde_yaml::from_str::<BridgeConfig>(yaml).is_err());
    }
}
