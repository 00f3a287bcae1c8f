//! TASKMON Core - Data Types
//!
//! Pure data structures shared by every TASKMON crate: identifiers, lifecycle
//! and message enums, log messages, status snapshots, configuration and
//! errors. This crate contains no coordination logic.

mod config;
mod enums;
mod error;
mod identity;
mod message;
mod status;

pub use config::{LogConfig, MonitorConfig};
pub use enums::{
    ActivityKind, ActivityResult, DurationType, EnumParseError, ExecutionState, MessageLevel,
    MessageType,
};
pub use error::{ConfigError, TaskError, TaskResult, UsageError};
pub use identity::{new_task_id, ActivityId, Sequence, TaskId, Timestamp};
pub use message::{LogException, LogMessage};
pub use status::{ActivityStatus, StatusReport};

/// Percentage scale used for progress and allocation values.
pub const FULL_PERCENT: f64 = 100.0;

/// Tolerance used when comparing computed percentages.
pub const PERCENT_EPSILON: f64 = 1e-6;

/// Clamp a percentage into `[0, 100]`, mapping NaN to 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, FULL_PERCENT)
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_clamp_percent_stays_in_range(value in proptest::num::f64::ANY) {
            let clamped = clamp_percent(value);
            prop_assert!((0.0..=FULL_PERCENT).contains(&clamped));
        }

        #[test]
        fn prop_correlation_id_round_trips(raw in any::<u64>()) {
            let id = ActivityId::new(raw);
            prop_assert_eq!(ActivityId::from_correlation_id(&id.correlation_id()), Some(id));
        }
    }
}
