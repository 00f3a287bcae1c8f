//! Point-in-time status snapshots
//!
//! These are the shapes a UI or remote caller polls for. They are plain data
//! and carry no references back into the monitor.

use crate::{ActivityId, DurationType, TaskId, Timestamp};
use serde::{Deserialize, Serialize};

/// Status of one in-progress activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ActivityStatus {
    pub id: ActivityId,
    /// Nesting depth; top-level phases are level 1.
    pub processing_level: u32,
    pub name: String,
    pub description: String,
    pub duration_type: DurationType,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub last_updated: Option<Timestamp>,
    pub relative_progress: f64,
}

/// Snapshot of a whole task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StatusReport {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub task_id: TaskId,
    pub task_name: String,
    pub task_description: String,
    pub relative_progress: f64,
    pub error_count: u64,
    pub warning_count: u64,
    pub is_cancelled: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub started_at: Option<Timestamp>,
    /// Every in-progress activity, flattened depth-first.
    pub activities: Vec<ActivityStatus>,
}

impl StatusReport {
    /// Find an activity entry by id.
    pub fn activity(&self, id: ActivityId) -> Option<&ActivityStatus> {
        self.activities.iter().find(|a| a.id == id)
    }

    /// The most deeply nested in-progress activity, which is usually the one
    /// a progress pane shows as "current".
    pub fn deepest_activity(&self) -> Option<&ActivityStatus> {
        self.activities
            .iter()
            .rev()
            .max_by_key(|a| a.processing_level)
    }

    /// Overall progress rounded to a whole percent, for display.
    pub fn percent_complete(&self) -> u8 {
        self.relative_progress.clamp(0.0, 100.0).round() as u8
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}
