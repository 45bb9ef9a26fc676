use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid failure_threshold: {0}. Must be at least 1")]
    InvalidFailureThreshold(u32),

    #[error("Invalid reset_timeout_secs: {0}. Must be positive")]
    InvalidResetTimeout(u64),

    #[error("Invalid recent_events_capacity: {0}. Must be at least 1")]
    InvalidJournalCapacity(usize),

    #[error("Invalid error_window_secs: {0}. Must be positive")]
    InvalidErrorWindow(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Dispatcher default_targets cannot be empty")]
    EmptyDefaultTargets,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .halo/config.yaml (project config)
    /// 3. .halo/local.yaml (project local overrides, optional)
    /// 4. Environment variables (HALO_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".halo/config.yaml"))
            .merge(Yaml::file(".halo/local.yaml"))
            .merge(Env::prefixed("HALO_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold(
                config.breaker.failure_threshold,
            ));
        }
        if config.breaker.reset_timeout_secs == 0 {
            return Err(ConfigError::InvalidResetTimeout(
                config.breaker.reset_timeout_secs,
            ));
        }
        if config.bus.recent_events_capacity == 0 {
            return Err(ConfigError::InvalidJournalCapacity(
                config.bus.recent_events_capacity,
            ));
        }
        if config.triggers.error_window_secs == 0 {
            return Err(ConfigError::InvalidErrorWindow(
                config.triggers.error_window_secs,
            ));
        }
        if config.dispatcher.default_targets.is_empty() {
            return Err(ConfigError::EmptyDefaultTargets);
        }

        let level = config.logging.level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{BreakerSettings, DispatcherConfig, LoggingConfig};
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            "breaker:\n  failure_threshold: 2\ndispatcher:\n  default_targets: [envkeeper]"
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.breaker.failure_threshold, 2);
        assert_eq!(config.dispatcher.default_targets, vec!["envkeeper"]);
        // Untouched values keep their defaults.
        assert_eq!(config.bus.recent_events_capacity, 256);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = Config {
            breaker: BreakerSettings {
                failure_threshold: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidFailureThreshold(0))
        ));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let config = Config {
            logging: LoggingConfig {
                level: "loud".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_empty_targets_rejected() {
        let config = Config {
            dispatcher: DispatcherConfig {
                default_targets: Vec::new(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDefaultTargets)
        ));
    }
}
