//! Scoped handles over activities.
//!
//! A handle names an activity by id and resolves it through the monitor on
//! every call; it never holds the record itself. Dropping a handle ends the
//! activity. Once the activity is gone (removed, or discarded by a reset)
//! every call is a no-op returning `Ok(false)` / `Ok(None)`.

use crate::{ActivitySnapshot, NewActivity, TaskMonitor};
use taskmon_core::{ActivityId, LogMessage, MessageLevel, MessageType, TaskResult};

fn end_on_drop(monitor: &TaskMonitor, id: ActivityId) {
    if let Err(error) = monitor.end_activity(id) {
        tracing::warn!(activity_id = %id, %error, "Failed to end activity on drop");
    }
}

// ============================================================================
// ACTIVITY HANDLE
// ============================================================================

/// Scoped access to one activity; ends it when dropped.
///
/// ```
/// use taskmon_monitor::{NewActivity, TaskMonitor};
///
/// # fn main() -> taskmon_core::TaskResult<()> {
/// let monitor = TaskMonitor::new("Report", "");
/// let id = {
///     let render = monitor.start_activity(0.0, NewActivity::group("Render"))?;
///     render.set_progress(40.0)?;
///     render.id()
/// }; // dropped here: the activity is ended
/// assert!(monitor.activity(id)?.map(|a| a.is_completed()).unwrap_or(false));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use = "dropping an ActivityHandle ends the activity"]
pub struct ActivityHandle {
    monitor: TaskMonitor,
    id: ActivityId,
    closed: bool,
}

impl ActivityHandle {
    pub(crate) fn new(monitor: TaskMonitor, id: ActivityId) -> Self {
        Self {
            monitor,
            id,
            closed: false,
        }
    }

    pub fn id(&self) -> ActivityId {
        self.id
    }

    pub fn monitor(&self) -> &TaskMonitor {
        &self.monitor
    }

    pub fn snapshot(&self) -> TaskResult<Option<ActivitySnapshot>> {
        self.monitor.activity(self.id)
    }

    pub fn progress(&self) -> TaskResult<Option<f64>> {
        self.monitor.activity_progress(self.id)
    }

    pub fn begin(&self) -> TaskResult<bool> {
        self.monitor.begin_activity(self.id)
    }

    /// Report `current` out of `total`; see [`TaskMonitor::update_activity`].
    pub fn update(&self, current: f64, total: f64, description: Option<&str>) -> TaskResult<bool> {
        self.monitor
            .update_activity(self.id, current, total, description)
    }

    pub fn set_description(&self, description: &str) -> TaskResult<bool> {
        self.monitor.set_description(self.id, description)
    }

    pub fn set_progress(&self, percent: f64) -> TaskResult<bool> {
        self.monitor.set_progress(self.id, percent)
    }

    // === Item counters ===

    pub fn current_progress_count(&self) -> TaskResult<Option<u64>> {
        Ok(self.snapshot()?.map(|a| a.current_count))
    }

    pub fn set_current_progress_count(&self, current: u64) -> TaskResult<bool> {
        self.monitor
            .set_progress_counts(self.id, Some(current), None)
    }

    pub fn maximum_progress_count(&self) -> TaskResult<Option<u64>> {
        Ok(self.snapshot()?.map(|a| a.maximum_count))
    }

    pub fn set_maximum_progress_count(&self, maximum: u64) -> TaskResult<bool> {
        self.monitor
            .set_progress_counts(self.id, None, Some(maximum))
    }

    pub fn increment_progress(&self) -> TaskResult<bool> {
        self.monitor.increment_progress(self.id)
    }

    /// Refresh a timed activity from the wall clock.
    pub fn tick(&self) -> TaskResult<bool> {
        self.monitor.tick(self.id)
    }

    // === Logging ===

    pub fn log_information(&self, text: impl Into<String>) -> TaskResult<bool> {
        self.log_message(LogMessage::information(text))
    }

    pub fn log_warning(&self, text: impl Into<String>) -> TaskResult<bool> {
        self.log_message(LogMessage::warning(text))
    }

    pub fn log_error(&self, text: impl Into<String>) -> TaskResult<bool> {
        self.log_message(LogMessage::error(text))
    }

    pub fn log(
        &self,
        message_type: MessageType,
        level: MessageLevel,
        text: impl Into<String>,
    ) -> TaskResult<bool> {
        self.log_message(LogMessage::new(message_type, level, text))
    }

    pub fn log_message(&self, message: LogMessage) -> TaskResult<bool> {
        self.monitor.log_activity(self.id, message)
    }

    // === Children ===

    /// Add a child holding `percent` of this activity and begin it.
    pub fn start_child(&self, percent: f64, new_activity: NewActivity) -> TaskResult<Option<ActivityHandle>> {
        let Some(child) = self.monitor.add_child(self.id, percent, new_activity)? else {
            return Ok(None);
        };
        self.monitor.begin_activity(child)?;
        Ok(Some(ActivityHandle::new(self.monitor.clone(), child)))
    }

    /// Reserve `percent` of this activity for a group started later.
    pub fn allocate(&self, percent: f64, new_activity: NewActivity) -> TaskResult<Option<AllocationHandle>> {
        let child = self
            .monitor
            .add_child(self.id, percent, new_activity.into_group())?;
        Ok(child.map(|id| AllocationHandle::new(self.monitor.clone(), id)))
    }

    // === Completion ===

    /// Record a failure and end the activity.
    pub fn fail(mut self, message: &str) -> TaskResult<bool> {
        self.closed = true;
        self.monitor.fail_activity(self.id, message)
    }

    /// End the activity now rather than on drop.
    pub fn end(mut self) -> TaskResult<bool> {
        self.closed = true;
        self.monitor.end_activity(self.id)
    }
}

impl Drop for ActivityHandle {
    fn drop(&mut self) {
        if !self.closed {
            end_on_drop(&self.monitor, self.id);
        }
    }
}

// ============================================================================
// ALLOCATION HANDLE
// ============================================================================

/// Scoped access to a reserved share of progress.
///
/// The underlying group stays Pending until the first activity inside it
/// begins. Dropping the handle ends the group and everything in it.
#[derive(Debug)]
#[must_use = "dropping an AllocationHandle ends the allocation"]
pub struct AllocationHandle {
    monitor: TaskMonitor,
    id: ActivityId,
    closed: bool,
}

impl AllocationHandle {
    pub(crate) fn new(monitor: TaskMonitor, id: ActivityId) -> Self {
        Self {
            monitor,
            id,
            closed: false,
        }
    }

    pub fn id(&self) -> ActivityId {
        self.id
    }

    pub fn snapshot(&self) -> TaskResult<Option<ActivitySnapshot>> {
        self.monitor.activity(self.id)
    }

    pub fn progress(&self) -> TaskResult<Option<f64>> {
        self.monitor.activity_progress(self.id)
    }

    /// Start an activity holding `percent` of this allocation.
    pub fn start_activity(&self, percent: f64, new_activity: NewActivity) -> TaskResult<Option<ActivityHandle>> {
        let Some(child) = self.monitor.add_child(self.id, percent, new_activity)? else {
            return Ok(None);
        };
        self.monitor.begin_activity(child)?;
        Ok(Some(ActivityHandle::new(self.monitor.clone(), child)))
    }

    /// Carve a nested allocation out of this one.
    pub fn allocate(&self, percent: f64, new_activity: NewActivity) -> TaskResult<Option<AllocationHandle>> {
        let child = self
            .monitor
            .add_child(self.id, percent, new_activity.into_group())?;
        Ok(child.map(|id| AllocationHandle::new(self.monitor.clone(), id)))
    }

    pub fn log_information(&self, text: impl Into<String>) -> TaskResult<bool> {
        self.monitor
            .log_activity(self.id, LogMessage::information(text))
    }

    pub fn log_warning(&self, text: impl Into<String>) -> TaskResult<bool> {
        self.monitor.log_activity(self.id, LogMessage::warning(text))
    }

    pub fn log_error(&self, text: impl Into<String>) -> TaskResult<bool> {
        self.monitor.log_activity(self.id, LogMessage::error(text))
    }

    pub fn end(mut self) -> TaskResult<bool> {
        self.closed = true;
        self.monitor.end_activity(self.id)
    }
}

impl Drop for AllocationHandle {
    fn drop(&mut self) {
        if !self.closed {
            end_on_drop(&self.monitor, self.id);
        }
    }
}
