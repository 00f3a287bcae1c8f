//! Error types for TASKMON operations

use crate::{ActivityId, LogException};
use thiserror::Error;

/// Caller invariant violations. These always fail fast.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UsageError {
    #[error("Activity {activity_id} has child activities; its progress is derived and cannot be set")]
    ProgressOnParent { activity_id: ActivityId },

    #[error("Invalid allocation percent: {value}")]
    InvalidPercent { value: f64 },

    #[error("Task has finished; reset the monitor before starting new activities")]
    TaskFinished,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all TASKMON errors.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Raised by the throw-on-error / throw-on-warning log policy. Displays
    /// as the logged message text.
    #[error("{0}")]
    Logged(#[from] LogException),

    #[error("Monitor lock poisoned")]
    LockPoisoned,
}

impl TaskError {
    /// The exception chain carried by a `Logged` error.
    pub fn log_exception(&self) -> Option<&LogException> {
        match self {
            TaskError::Logged(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, TaskError::Usage(_))
    }
}

/// Result type alias for TASKMON operations.
pub type TaskResult<T> = Result<T, TaskError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogMessage;

    #[test]
    fn test_usage_error_display_progress_on_parent() {
        let err = UsageError::ProgressOnParent {
            activity_id: ActivityId::new(12),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Activity 12"));
        assert!(msg.contains("cannot be set"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "progress_notification_step".to_string(),
            value: "0".to_string(),
            reason: "must be in (0, 100]".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("progress_notification_step"));
        assert!(msg.contains("must be in (0, 100]"));
    }

    #[test]
    fn test_logged_error_displays_message_text_only() {
        let exception = LogException::from_message(&LogMessage::error("boom"));
        let err = TaskError::from(exception);
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.log_exception().map(|e| e.message.as_str()), Some("boom"));
    }

    #[test]
    fn test_task_error_from_variants() {
        let usage = TaskError::from(UsageError::InvalidPercent { value: -5.0 });
        assert!(usage.is_usage());

        let config = TaskError::from(ConfigError::InvalidValue {
            field: "buffer_size".to_string(),
            value: "x".to_string(),
            reason: "not a number".to_string(),
        });
        assert!(matches!(config, TaskError::Config(_)));
        assert!(config.log_exception().is_none());
    }
}
