//! Configuration loader using figment.
//!
//! Sources, lowest to highest priority:
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides passed to [`ConfigLoader::merge`]
//! 3. Config file (`ntbridge.toml` / `ntbridge.yaml`)
//! 4. Environment variables (`NTBRIDGE_*`)
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: searches `ntbridge.toml`
//! - `yaml-config`: searches `ntbridge.yaml` and `ntbridge.yml`
//!
//! # Environment Variable Mapping
//!
//! The `NTBRIDGE_` prefix is stripped and `__` separates nesting levels:
//!
//! - `NTBRIDGE_CORRELATION__DEFAULT_TIMEOUT_MS=8000` → `correlation.default_timeout_ms = 8000`
//! - `NTBRIDGE_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//!
//! # Example
//!
//! ```rust,ignore
//! use ntbridge_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new().load()?;
//!
//! let config = ConfigLoader::new()
//!     .file("./deploy/ntbridge.toml")
//!     .without_env()
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace};

use super::error::{ConfigError, ConfigResult};
use super::schema::BridgeConfig;

/// Prefix of environment variables read by the loader.
pub const ENV_PREFIX: &str = "NTBRIDGE_";

/// Directory under the user config dir searched for config files.
const APP_DIR: &str = "ntbridge";

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Overrides the search when set.
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader that searches the default locations and reads the
    /// environment.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Adds a search path; once any is added the defaults are not searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file, which must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a configuration programmatically, over the defaults.
    pub fn merge(mut self, config: BridgeConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<BridgeConfig> {
        let config: BridgeConfig = self.build_figment()?.extract()?;

        debug!(
            timeout_ms = config.correlation.default_timeout_ms,
            logging_level = %config.logging.level,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(BridgeConfig::default()));
        figment = figment.merge(std::mem::take(&mut self.figment));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, path)?;
        } else if let Some(path) = self.find_config_file() {
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            debug!("No configuration file found, using defaults");
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment)
    }

    /// Merges a single file, dispatching on its extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(APP_DIR));
        }
        paths
    }

    /// First existing config file, in search-path order.
    fn find_config_file(&self) -> Option<PathBuf> {
        let names = Self::file_names();
        self.resolve_search_paths()
            .into_iter()
            .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
            .find(|path| path.exists())
    }

    #[allow(unused_mut)]
    fn file_names() -> Vec<&'static str> {
        let mut names = Vec::new();
        #[cfg(feature = "toml-config")]
        names.push("ntbridge.toml");
        #[cfg(feature = "yaml-config")]
        names.extend(["ntbridge.yaml", "ntbridge.yml"]);
        names
    }
}

/// Loads the configuration from the default locations.
pub fn load_config() -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().load()
}

/// Loads the configuration from `path`, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config, BridgeConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = ConfigLoader::new()
            .file("/definitely/not/here/ntbridge.toml")
            .load()
            .unwrap_err();

        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("ntbridge.ini", "level = debug")?;

            let err = ConfigLoader::new().file("ntbridge.ini").load().unwrap_err();

            assert!(matches!(err, ConfigError::UnsupportedFormat(ext) if ext == "ini"));
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_file_then_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ntbridge.toml",
                r#"
                [correlation]
                default_timeout_ms = 2000

                [logging]
                level = "debug"
                "#,
            )?;
            jail.set_env("NTBRIDGE_CORRELATION__DEFAULT_TIMEOUT_MS", "7000");
            jail.set_env("NTBRIDGE_GROUP__MEMBER_FETCH_SIZE", "100");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.correlation.default_timeout_ms, 7000);
            assert_eq!(config.group.member_fetch_size, 100);
            assert_eq!(config.logging.level, LogLevel::Debug);
            Ok(())
        });
    }

    #[test]
    fn test_merge_overrides_defaults() {
        Jail::expect_with(|jail| {
            let mut base = BridgeConfig::default();
            base.correlation.channel_capacity = 8;

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .merge(base)
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.correlation.channel_capacity, 8);
            Ok(())
        });
    }
}
