//! Configuration types

use crate::{ConfigError, MessageLevel, MessageType, TaskError, TaskResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message log configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Maximum number of buffered messages; `<= 0` keeps everything.
    pub buffer_size: i64,
    /// Messages below this level are dropped on arrival.
    pub minimum_level: MessageLevel,
    /// When set, only these message types are accepted.
    pub allowed_types: Option<Vec<MessageType>>,
    /// Appending an error raises it back to the caller.
    pub throw_on_error: bool,
    /// Appending a warning raises it back to the caller.
    pub throw_on_warning: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            minimum_level: MessageLevel::Low,
            allowed_types: None,
            throw_on_error: false,
            throw_on_warning: false,
        }
    }
}

impl LogConfig {
    /// Keep every message.
    pub fn unbounded() -> Self {
        Self {
            buffer_size: 0,
            ..Self::default()
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.buffer_size > 0
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - an explicit type allow-list is not empty
    pub fn validate(&self) -> TaskResult<()> {
        if let Some(types) = &self.allowed_types {
            if types.is_empty() {
                return Err(TaskError::Config(ConfigError::InvalidValue {
                    field: "log.allowed_types".to_string(),
                    value: "[]".to_string(),
                    reason: "allowed_types must name at least one type; use None to accept all"
                        .to_string(),
                }));
            }
        }
        Ok(())
    }
}

/// Master monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub log: LogConfig,
    /// Minimum wall-clock duration applied to activities that do not set
    /// their own.
    pub default_minimum_duration: Duration,
    /// Overall-progress step, in percent, between completion checkpoints.
    pub progress_notification_step: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            default_minimum_duration: Duration::ZERO,
            progress_notification_step: 10.0,
        }
    }
}

impl MonitorConfig {
    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(TaskError::Config) if invalid.
    ///
    /// Validates:
    /// - progress_notification_step is finite and in (0, 100]
    /// - the log section
    pub fn validate(&self) -> TaskResult<()> {
        let step = self.progress_notification_step;
        if !step.is_finite() || step <= 0.0 || step > 100.0 {
            return Err(TaskError::Config(ConfigError::InvalidValue {
                field: "progress_notification_step".to_string(),
                value: step.to_string(),
                reason: "progress_notification_step must be in (0, 100]".to_string(),
            }));
        }

        self.log.validate()
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TASKMON_LOG_BUFFER_SIZE`: Buffered message cap, `<= 0` for unbounded (default: 1000)
    /// - `TASKMON_LOG_MIN_LEVEL`: Low, Normal, High or Critical (default: Low)
    /// - `TASKMON_LOG_THROW_ON_ERROR`: `true`/`1` to raise logged errors (default: false)
    /// - `TASKMON_LOG_THROW_ON_WARNING`: `true`/`1` to raise logged warnings (default: false)
    /// - `TASKMON_MIN_DURATION_MS`: Default minimum activity duration (default: 0)
    /// - `TASKMON_PROGRESS_STEP`: Completion checkpoint step in percent (default: 10)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`MonitorConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |key: &str, fallback: bool| {
            lookup(key)
                .map(|s| s == "true" || s == "1")
                .unwrap_or(fallback)
        };

        Self {
            log: LogConfig {
                buffer_size: lookup("TASKMON_LOG_BUFFER_SIZE")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.log.buffer_size),
                minimum_level: lookup("TASKMON_LOG_MIN_LEVEL")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.log.minimum_level),
                allowed_types: defaults.log.allowed_types,
                throw_on_error: flag("TASKMON_LOG_THROW_ON_ERROR", defaults.log.throw_on_error),
                throw_on_warning: flag(
                    "TASKMON_LOG_THROW_ON_WARNING",
                    defaults.log.throw_on_warning,
                ),
            },
            default_minimum_duration: lookup("TASKMON_MIN_DURATION_MS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_minimum_duration),
            progress_notification_step: lookup("TASKMON_PROGRESS_STEP")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.progress_notification_step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_is_valid() {
        assert!(MonitorConfig::default().validate().is_ok());
        assert!(LogConfig::default().is_bounded());
        assert!(!LogConfig::unbounded().is_bounded());
    }

    #[test]
    fn test_rejects_bad_progress_step() {
        for step in [0.0, -1.0, 150.0, f64::NAN] {
            let config = MonitorConfig {
                progress_notification_step: step,
                ..MonitorConfig::default()
            };
            assert!(matches!(config.validate(), Err(TaskError::Config(_))));
        }
    }

    #[test]
    fn test_rejects_empty_type_allow_list() {
        let config = MonitorConfig {
            log: LogConfig {
                allowed_types: Some(vec![]),
                ..LogConfig::default()
            },
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup_overlays_values() {
        let config = MonitorConfig::from_lookup(lookup_from(&[
            ("TASKMON_LOG_BUFFER_SIZE", "25"),
            ("TASKMON_LOG_MIN_LEVEL", "high"),
            ("TASKMON_LOG_THROW_ON_ERROR", "1"),
            ("TASKMON_MIN_DURATION_MS", "250"),
            ("TASKMON_PROGRESS_STEP", "5"),
        ]));
        assert_eq!(config.log.buffer_size, 25);
        assert_eq!(config.log.minimum_level, MessageLevel::High);
        assert!(config.log.throw_on_error);
        assert!(!config.log.throw_on_warning);
        assert_eq!(config.default_minimum_duration, Duration::from_millis(250));
        assert_eq!(config.progress_notification_step, 5.0);
    }

    #[test]
    fn test_from_lookup_falls_back_on_garbage() {
        let config = MonitorConfig::from_lookup(lookup_from(&[
            ("TASKMON_LOG_BUFFER_SIZE", "lots"),
            ("TASKMON_LOG_MIN_LEVEL", "loud"),
        ]));
        assert_eq!(config, MonitorConfig::default());
    }
}
