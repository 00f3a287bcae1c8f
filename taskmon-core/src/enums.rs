//! Enum types for TASKMON activities and messages

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error when parsing an enum from its string representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind}: {value}")]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

impl EnumParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Implements `Display` and `FromStr` on top of `as_str()` / `parse_str()`.
macro_rules! impl_str_conversions {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse_str(s)
            }
        }
    };
}

// ============================================================================
// ACTIVITY LIFECYCLE
// ============================================================================

/// Execution state of an activity.
///
/// ```text
/// Pending ─── begin() ──→ InProgress ─── end() ──→ Completed
/// ```
///
/// No transition leaves `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ExecutionState {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Pending => "Pending",
            ExecutionState::InProgress => "InProgress",
            ExecutionState::Completed => "Completed",
        }
    }

    pub fn parse_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ExecutionState::Pending),
            "inprogress" | "in_progress" => Ok(ExecutionState::InProgress),
            "completed" => Ok(ExecutionState::Completed),
            _ => Err(EnumParseError::new("execution state", s)),
        }
    }

    /// Check whether `self` may move to `next`.
    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        next > *self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Completed)
    }
}

impl_str_conversions!(ExecutionState);

/// Final result of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ActivityResult {
    /// Not finished yet
    #[default]
    None,
    Succeeded,
    Failed,
    CompletedWithWarnings,
}

impl ActivityResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityResult::None => "None",
            ActivityResult::Succeeded => "Succeeded",
            ActivityResult::Failed => "Failed",
            ActivityResult::CompletedWithWarnings => "CompletedWithWarnings",
        }
    }

    pub fn parse_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "none" => Ok(ActivityResult::None),
            "succeeded" => Ok(ActivityResult::Succeeded),
            "failed" => Ok(ActivityResult::Failed),
            "completedwithwarnings" | "completed_with_warnings" => {
                Ok(ActivityResult::CompletedWithWarnings)
            }
            _ => Err(EnumParseError::new("activity result", s)),
        }
    }

    /// Derive a result from the error and warning counts of a finished subtree.
    pub fn from_counts(errors: u32, warnings: u32) -> Self {
        if errors > 0 {
            ActivityResult::Failed
        } else if warnings > 0 {
            ActivityResult::CompletedWithWarnings
        } else {
            ActivityResult::Succeeded
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ActivityResult::Failed)
    }
}

impl_str_conversions!(ActivityResult);

/// Whether the remaining duration of an activity can be estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum DurationType {
    #[default]
    Unknown,
    Finite,
}

impl DurationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationType::Unknown => "Unknown",
            DurationType::Finite => "Finite",
        }
    }

    pub fn parse_str(s: &str) -> Result<Self, EnumParseError> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(DurationType::Unknown),
            "finite" => Ok(DurationType::Finite),
            _ => Err(EnumParseError::new("duration type", s)),
        }
    }
}

impl_str_conversions!(DurationType);

/// Flavor of an activity. One record type covers all flavors; the tag only
/// changes how the activity is constructed and how it measures progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityKind {
    /// Container whose progress comes from its children
    #[default]
    Group,
    /// Counts through a known number of items
    ProcessItems { total_items: u64 },
    /// Progress follows wall-clock time against an expected duration
    TimedDuration { expected_ms: u64 },
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Group => "group",
            ActivityKind::ProcessItems { .. } => "process_items",
            ActivityKind::TimedDuration { .. } => "timed_duration",
        }
    }

    /// Duration type an activity of this kind reports once started.
    pub fn duration_type(&self) -> DurationType {
        match self {
            ActivityKind::Group => DurationType::Unknown,
            ActivityKind::ProcessItems { total_items } if *total_items > 0 => DurationType::Finite,
            ActivityKind::TimedDuration { expected_ms } if *expected_ms > 0 => DurationType::Finite,
            _ => DurationType::Unknown,
        }
    }

    /// Item total used for counter-style progress, when the kind has one.
    pub fn total_items(&self) -> Option<u64> {
        match self {
            ActivityKind::ProcessItems { total_items } => Some(*total_items),
            _ => None,
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// MESSAGE CLASSIFICATION
// ============================================================================

/// Type of a task log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum MessageType {
    Information,
    Error,
    Warning,
    ResultSuccess,
    ResultFailure,
    ActivityProgress,
    ActivityStart,
    ActivityEnd,
}

impl MessageType {
    /// Every message type, in declaration order.
    pub const ALL: [MessageType; 8] = [
        MessageType::Information,
        MessageType::Error,
        MessageType::Warning,
        MessageType::ResultSuccess,
        MessageType::ResultFailure,
        MessageType::ActivityProgress,
        MessageType::ActivityStart,
        MessageType::ActivityEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Information => "Information",
            MessageType::Error => "Error",
            MessageType::Warning => "Warning",
            MessageType::ResultSuccess => "ResultSuccess",
            MessageType::ResultFailure => "ResultFailure",
            MessageType::ActivityProgress => "ActivityProgress",
            MessageType::ActivityStart => "ActivityStart",
            MessageType::ActivityEnd => "ActivityEnd",
        }
    }

    pub fn parse_str(s: &str) -> Result<Self, EnumParseError> {
        MessageType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EnumParseError::new("message type", s))
    }

    /// Success or failure result record.
    pub fn is_result(&self) -> bool {
        matches!(self, MessageType::ResultSuccess | MessageType::ResultFailure)
    }

    /// Error or warning.
    pub fn is_exception(&self) -> bool {
        matches!(self, MessageType::Error | MessageType::Warning)
    }
}

impl_str_conversions!(MessageType);

/// Importance of a task log message. Ordered from least to most important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum MessageLevel {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl MessageLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageLevel::Low => "Low",
            MessageLevel::Normal => "Normal",
            MessageLevel::High => "High",
            MessageLevel::Critical => "Critical",
        }
    }

    pub fn parse_str(s: &str) -> Result<Self, EnumParseError> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(MessageLevel::Low),
            "normal" => Ok(MessageLevel::Normal),
            "high" => Ok(MessageLevel::High),
            "critical" => Ok(MessageLevel::Critical),
            _ => Err(EnumParseError::new("message level", s)),
        }
    }

    /// Level of lifecycle messages for an activity at the given nesting depth.
    ///
    /// Top-level phases (depth 1) stand out in a flat log view; deeper
    /// activities fade into the background.
    pub fn for_depth(depth: u32) -> Self {
        match depth {
            0 | 1 => MessageLevel::Critical,
            2 => MessageLevel::Normal,
            _ => MessageLevel::Low,
        }
    }
}

impl_str_conversions!(MessageLevel);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_state_only_moves_forward() {
        assert!(ExecutionState::Pending.can_transition_to(ExecutionState::InProgress));
        assert!(ExecutionState::Pending.can_transition_to(ExecutionState::Completed));
        assert!(ExecutionState::InProgress.can_transition_to(ExecutionState::Completed));
        assert!(!ExecutionState::Completed.can_transition_to(ExecutionState::InProgress));
        assert!(!ExecutionState::InProgress.can_transition_to(ExecutionState::InProgress));
    }

    #[test]
    fn test_result_from_counts() {
        assert_eq!(ActivityResult::from_counts(0, 0), ActivityResult::Succeeded);
        assert_eq!(
            ActivityResult::from_counts(0, 2),
            ActivityResult::CompletedWithWarnings
        );
        assert_eq!(ActivityResult::from_counts(1, 2), ActivityResult::Failed);
    }

    #[test]
    fn test_level_for_depth() {
        assert_eq!(MessageLevel::for_depth(1), MessageLevel::Critical);
        assert_eq!(MessageLevel::for_depth(2), MessageLevel::Normal);
        assert_eq!(MessageLevel::for_depth(3), MessageLevel::Low);
        assert_eq!(MessageLevel::for_depth(12), MessageLevel::Low);
    }

    #[test]
    fn test_level_ordering() {
        assert!(MessageLevel::Low < MessageLevel::Normal);
        assert!(MessageLevel::Normal < MessageLevel::High);
        assert!(MessageLevel::High < MessageLevel::Critical);
    }

    #[test]
    fn test_message_type_parse_is_case_insensitive() {
        assert_eq!("warning".parse::<MessageType>(), Ok(MessageType::Warning));
        assert_eq!(
            "ACTIVITYSTART".parse::<MessageType>(),
            Ok(MessageType::ActivityStart)
        );
        let err = "verbose".parse::<MessageType>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid message type: verbose");
    }

    #[test]
    fn test_message_type_groups() {
        assert!(MessageType::ResultFailure.is_result());
        assert!(!MessageType::Error.is_result());
        assert!(MessageType::Warning.is_exception());
        assert!(!MessageType::ActivityEnd.is_exception());
    }

    #[test]
    fn test_kind_duration_type() {
        assert_eq!(ActivityKind::Group.duration_type(), DurationType::Unknown);
        assert_eq!(
            ActivityKind::ProcessItems { total_items: 10 }.duration_type(),
            DurationType::Finite
        );
        assert_eq!(
            ActivityKind::ProcessItems { total_items: 0 }.duration_type(),
            DurationType::Unknown
        );
        assert_eq!(
            ActivityKind::TimedDuration { expected_ms: 500 }.duration_type(),
            DurationType::Finite
        );
    }

    #[test]
    fn test_display_round_trip() {
        for level in [
            MessageLevel::Low,
            MessageLevel::Normal,
            MessageLevel::High,
            MessageLevel::Critical,
        ] {
            assert_eq!(level.to_string().parse::<MessageLevel>(), Ok(level));
        }
        assert_eq!(
            "completed_with_warnings".parse::<ActivityResult>(),
            Ok(ActivityResult::CompletedWithWarnings)
        );
        assert_eq!(
            "in_progress".parse::<ExecutionState>(),
            Ok(ExecutionState::InProgress)
        );
    }
}
