//! Configuration model for the halo loop.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the remediation loop.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Event bus configuration
    #[serde(default)]
    pub bus: BusConfig,

    /// Circuit breaker configuration
    #[serde(default)]
    pub breaker: BreakerSettings,

    /// Trigger thresholds
    #[serde(default)]
    pub triggers: TriggerSettings,

    /// Task dispatcher configuration
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bounded size of the recent-events journal (most-recent-N).
    #[serde(default = "default_recent_events_capacity")]
    pub recent_events_capacity: usize,

    /// Shared secret for HMAC envelope signing. When set, the signature
    /// middleware is installed on the bus.
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// Dot-namespace prefixes whose envelopes must carry a valid signature.
    #[serde(default = "default_sensitive_prefixes")]
    pub sensitive_prefixes: Vec<String>,
}

const fn default_recent_events_capacity() -> usize {
    256
}

fn default_sensitive_prefixes() -> Vec<String> {
    vec!["squad.task".to_string()]
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            recent_events_capacity: default_recent_events_capacity(),
            signing_secret: None,
            sensitive_prefixes: default_sensitive_prefixes(),
        }
    }
}

/// Circuit breaker settings (per named operation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures before a breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open breaker waits before allowing a half-open trial.
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,

    /// Optional per-call timeout in milliseconds; a timed-out call counts
    /// as a failure.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_reset_timeout_secs() -> u64 {
    30
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
            request_timeout_ms: None,
        }
    }
}

/// Thresholds for the built-in triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSettings {
    /// Errors within the window before the error-rate trigger fires.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Rolling window for the error-rate trigger, in seconds.
    #[serde(default = "default_error_window_secs")]
    pub error_window_secs: u64,

    /// Totally-failed dispatches within the window before the feedback
    /// trigger raises an issue.
    #[serde(default = "default_dispatch_failure_threshold")]
    pub dispatch_failure_threshold: u32,

    /// Rolling window for the dispatch-failure trigger, in seconds.
    #[serde(default = "default_dispatch_failure_window_secs")]
    pub dispatch_failure_window_secs: u64,
}

const fn default_error_threshold() -> u32 {
    5
}

const fn default_error_window_secs() -> u64 {
    300
}

const fn default_dispatch_failure_threshold() -> u32 {
    3
}

const fn default_dispatch_failure_window_secs() -> u64 {
    600
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            error_window_secs: default_error_window_secs(),
            dispatch_failure_threshold: default_dispatch_failure_threshold(),
            dispatch_failure_window_secs: default_dispatch_failure_window_secs(),
        }
    }
}

/// Task dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Targets used when a task carries no explicit `target_agents`.
    #[serde(default = "default_targets")]
    pub default_targets: Vec<String>,

    /// Base URL of a remote squad API; when set, `halo run` registers an
    /// HTTP destination for each default target.
    #[serde(default)]
    pub squad_api_url: Option<String>,
}

fn default_targets() -> Vec<String> {
    vec!["dreamops".to_string()]
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_targets: default_targets(),
            squad_api_url: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Stdout format.
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Optional directory for a daily-rotated JSON log file.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bus.recent_events_capacity, 256);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.reset_timeout_secs, 30);
        assert!(config.breaker.request_timeout_ms.is_none());
        assert_eq!(config.triggers.error_threshold, 5);
        assert_eq!(config.dispatcher.default_targets, vec!["dreamops"]);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"breaker":{"failure_threshold":2}}"#).unwrap();
        assert_eq!(config.breaker.failure_threshold, 2);
        assert_eq!(config.breaker.reset_timeout_secs, 30);
        assert_eq!(config.bus.recent_events_capacity, 256);
    }
}
