//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BridgeConfig, CorrelationConfig, GroupConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BridgeConfig) -> ConfigResult<()> {
    validate_correlation_config(&config.correlation)?;
    validate_group_config(&config.group)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_correlation_config(config: &CorrelationConfig) -> ConfigResult<()> {
    if config.default_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "correlation.default_timeout_ms must be greater than 0",
        ));
    }

    if config.channel_capacity == 0 {
        return Err(ConfigError::validation(
            "correlation.channel_capacity must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_group_config(config: &GroupConfig) -> ConfigResult<()> {
    if config.member_fetch_size == 0 {
        return Err(ConfigError::validation(
            "group.member_fetch_size must be greater than 0",
        ));
    }

    if config.all_info_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "group.all_info_timeout_ms must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> ConfigResult<()> {
    if config.output == LogOutput::File && config.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(target) = config.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "logging.filters has an empty target: {target:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&BridgeConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let mut config = BridgeConfig::default();
        config.correlation.default_timeout_ms = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = BridgeConfig::default();
        config.correlation.channel_capacity = 0;
        assert!(validate_config(&config).is_err());

        let mut config = BridgeConfig::default();
        config.group.member_fetch_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = BridgeConfig::default();
        config.group.all_info_timeout_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = BridgeConfig::default();
        config.logging.output = LogOutput::File;

        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "logging.file_path"
        ));

        config.logging.file_path = Some("ntbridge.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_filter_target() {
        let mut config = BridgeConfig::default();
        config.logging.filters.insert(" ".into(), LogLevel::Debug);

        assert!(validate_config(&config).is_err());
    }
}
