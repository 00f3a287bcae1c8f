//! Activity records and the builder used to create them.

use crate::ActivityCollection;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use taskmon_core::{
    clamp_percent, ActivityId, ActivityKind, ActivityResult, ActivityStatus, DurationType,
    ExecutionState, Timestamp, FULL_PERCENT,
};

/// Progress a timed activity reports before it is explicitly ended.
pub(crate) const TIMED_PROGRESS_CAP: f64 = 99.0;

// ============================================================================
// BUILDER
// ============================================================================

/// Description of an activity to create.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use taskmon_monitor::NewActivity;
///
/// let new_activity = NewActivity::process_items("Import rows", 250)
///     .description("Reading the staging table")
///     .minimum_duration(Duration::from_millis(200));
/// assert_eq!(new_activity.name(), "Import rows");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    name: String,
    description: String,
    kind: ActivityKind,
    minimum_duration: Option<Duration>,
}

impl NewActivity {
    /// A container whose progress is derived from its children.
    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(name, ActivityKind::Group)
    }

    /// An activity that counts through `total_items` items.
    pub fn process_items(name: impl Into<String>, total_items: u64) -> Self {
        Self::with_kind(name, ActivityKind::ProcessItems { total_items })
    }

    /// An activity whose progress follows wall-clock time.
    pub fn timed(name: impl Into<String>, expected: Duration) -> Self {
        let expected_ms = u64::try_from(expected.as_millis()).unwrap_or(u64::MAX);
        Self::with_kind(name, ActivityKind::TimedDuration { expected_ms })
    }

    pub fn with_kind(name: impl Into<String>, kind: ActivityKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            minimum_duration: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Keep the activity open for at least this long once started.
    pub fn minimum_duration(mut self, duration: Duration) -> Self {
        self.minimum_duration = Some(duration);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    pub(crate) fn into_group(mut self) -> Self {
        self.kind = ActivityKind::Group;
        self
    }
}

// ============================================================================
// ARENA RECORD
// ============================================================================

/// One node of the activity tree, owned by the arena.
#[derive(Debug, Clone)]
pub(crate) struct Activity {
    pub id: ActivityId,
    pub parent: Option<ActivityId>,
    pub children: ActivityCollection,
    pub name: String,
    pub description: String,
    pub kind: ActivityKind,
    pub state: ExecutionState,
    pub result: ActivityResult,
    pub duration_type: DurationType,
    /// Stored progress; only authoritative for leaves and completed nodes.
    pub progress: f64,
    pub current_count: u64,
    pub maximum_count: u64,
    pub error_count: u32,
    pub warning_count: u32,
    pub started_at: Option<Timestamp>,
    pub last_updated: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub started: Option<Instant>,
    pub minimum_duration: Duration,
    pub depth: u32,
    pub status_message: Option<String>,
    pub terminated: bool,
}

impl Activity {
    pub fn new(
        id: ActivityId,
        parent: Option<ActivityId>,
        depth: u32,
        new_activity: NewActivity,
        default_minimum_duration: Duration,
    ) -> Self {
        let maximum_count = new_activity
            .kind
            .total_items()
            .unwrap_or(FULL_PERCENT as u64);
        Self {
            id,
            parent,
            children: ActivityCollection::new(id),
            name: new_activity.name,
            description: new_activity.description,
            kind: new_activity.kind,
            state: ExecutionState::Pending,
            result: ActivityResult::None,
            duration_type: DurationType::Unknown,
            progress: 0.0,
            current_count: 0,
            maximum_count,
            error_count: 0,
            warning_count: 0,
            started_at: None,
            last_updated: None,
            ended_at: None,
            started: None,
            minimum_duration: new_activity.minimum_duration.unwrap_or(default_minimum_duration),
            depth,
            status_message: None,
            terminated: false,
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move Pending to InProgress. Returns `false` if already begun.
    pub fn mark_started(&mut self) -> bool {
        if !self.state.can_transition_to(ExecutionState::InProgress) {
            return false;
        }
        let now = Utc::now();
        self.state = ExecutionState::InProgress;
        self.started_at = Some(now);
        self.last_updated = Some(now);
        self.started = Some(Instant::now());
        self.duration_type = self.kind.duration_type();
        true
    }

    /// Raise the stored progress. Values that do not exceed the current
    /// progress are ignored.
    pub fn raise_progress(&mut self, value: f64) -> bool {
        let value = clamp_percent(value);
        if value > self.progress {
            self.progress = value;
            true
        } else {
            false
        }
    }

    /// Percentage for `current` out of `total`; `total <= 0` means 100.
    pub fn percent_of(current: f64, total: f64) -> f64 {
        let total = if total > 0.0 { total } else { FULL_PERCENT };
        let current = if current.is_nan() { 0.0 } else { current.clamp(0.0, total) };
        (current / total * FULL_PERCENT).min(FULL_PERCENT)
    }

    /// Progress a timed activity should show right now.
    pub fn timed_progress(&self) -> Option<f64> {
        let ActivityKind::TimedDuration { expected_ms } = self.kind else {
            return None;
        };
        let elapsed = self.elapsed();
        let percent = if expected_ms == 0 {
            TIMED_PROGRESS_CAP
        } else {
            elapsed.as_millis() as f64 / expected_ms as f64 * FULL_PERCENT
        };
        Some(percent.min(TIMED_PROGRESS_CAP))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Time still owed to the minimum duration.
    pub fn remaining_minimum(&self) -> Duration {
        self.minimum_duration.saturating_sub(self.elapsed())
    }

    pub fn touch(&mut self) {
        self.last_updated = Some(Utc::now());
    }
}

// ============================================================================
// PUBLIC VIEW
// ============================================================================

/// Read-only copy of an activity's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    pub id: ActivityId,
    pub parent: Option<ActivityId>,
    pub children: Vec<ActivityId>,
    pub name: String,
    pub description: String,
    pub kind: ActivityKind,
    pub state: ExecutionState,
    pub result: ActivityResult,
    pub duration_type: DurationType,
    pub relative_progress: f64,
    /// Share of the parent this activity asked for.
    pub requested_percent: Option<f64>,
    /// Share of the parent this activity currently holds.
    pub allocated_percent: Option<f64>,
    pub current_count: u64,
    pub maximum_count: u64,
    pub error_count: u32,
    pub warning_count: u32,
    pub started_at: Option<Timestamp>,
    pub last_updated: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub processing_level: u32,
    pub status_message: Option<String>,
    pub terminated: bool,
}

impl ActivitySnapshot {
    pub fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn correlation_id(&self) -> String {
        self.id.correlation_id()
    }

    /// The entry this activity contributes to a status report.
    pub fn to_status(&self) -> ActivityStatus {
        ActivityStatus {
            id: self.id,
            processing_level: self.processing_level,
            name: self.name.clone(),
            description: self.description.clone(),
            duration_type: self.duration_type,
            last_updated: self.last_updated,
            relative_progress: self.relative_progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(new_activity: NewActivity) -> Activity {
        Activity::new(ActivityId::new(2), Some(ActivityId::new(1)), 1, new_activity, Duration::ZERO)
    }

    #[test]
    fn test_builder_defaults() {
        let new_activity = NewActivity::group("Load");
        assert_eq!(new_activity.kind(), ActivityKind::Group);
        let activity = leaf(new_activity);
        assert_eq!(activity.maximum_count, 100);
        assert_eq!(activity.state, ExecutionState::Pending);
        assert_eq!(activity.minimum_duration, Duration::ZERO);
    }

    #[test]
    fn test_process_items_uses_total_as_maximum() {
        let activity = leaf(NewActivity::process_items("Rows", 40));
        assert_eq!(activity.maximum_count, 40);
    }

    #[test]
    fn test_explicit_minimum_duration_wins() {
        let new_activity = NewActivity::group("Load").minimum_duration(Duration::from_millis(5));
        let activity = Activity::new(ActivityId::new(2), None, 1, new_activity, Duration::from_secs(1));
        assert_eq!(activity.minimum_duration, Duration::from_millis(5));
    }

    #[test]
    fn test_mark_started_once() {
        let mut activity = leaf(NewActivity::process_items("Rows", 10));
        assert!(activity.mark_started());
        assert_eq!(activity.duration_type, DurationType::Finite);
        assert!(activity.started_at.is_some());
        assert!(!activity.mark_started());
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut activity = leaf(NewActivity::group("Load"));
        assert!(activity.raise_progress(40.0));
        assert!(!activity.raise_progress(30.0));
        assert!(!activity.raise_progress(40.0));
        assert!(activity.raise_progress(250.0));
        assert_eq!(activity.progress, 100.0);
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(Activity::percent_of(5.0, 10.0), 50.0);
        assert_eq!(Activity::percent_of(15.0, 10.0), 100.0);
        assert_eq!(Activity::percent_of(-3.0, 10.0), 0.0);
        assert_eq!(Activity::percent_of(40.0, 0.0), 40.0);
        assert_eq!(Activity::percent_of(40.0, -1.0), 40.0);
    }

    #[test]
    fn test_timed_progress_is_capped() {
        let mut activity = leaf(NewActivity::timed("Wait", Duration::ZERO));
        activity.mark_started();
        assert_eq!(activity.timed_progress(), Some(TIMED_PROGRESS_CAP));
        assert!(leaf(NewActivity::group("g")).timed_progress().is_none());
    }
}
