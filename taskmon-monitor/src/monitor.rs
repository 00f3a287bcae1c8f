//! The task monitor: activity arena, shared log and event fan-out for one
//! task run.
//!
//! # Locking
//!
//! All mutable state sits behind one mutex. Every public operation takes
//! the lock, mutates, queues the resulting events, releases the lock and
//! then flushes the event queue, so listeners never run under the lock and
//! may call back into the monitor. The only operation that waits is
//! [`TaskMonitor::end_activity`] when an activity has a minimum duration;
//! it sleeps with the lock released.

use crate::activity::{Activity, ActivitySnapshot, NewActivity};
use crate::allocation::validate_percent;
use crate::handle::{ActivityHandle, AllocationHandle};
use crate::tree::ActivityTree;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use taskmon_core::{
    new_task_id, ActivityId, ActivityKind, ActivityResult, DurationType, ExecutionState,
    LogException, LogMessage, MessageLevel, MessageType, MonitorConfig, Sequence, StatusReport,
    TaskError, TaskId, TaskResult, Timestamp, UsageError, FULL_PERCENT, PERCENT_EPSILON,
};
use taskmon_events::{
    broadcast, BroadcastListener, EventDispatcher, FnListener, MonitorEvent, MonitorListener,
    SubscriptionId,
};
use taskmon_log::{MessageFilter, MessageLog};

/// Longest single sleep while waiting out a minimum duration; bounds how
/// late a cancellation is noticed.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Events raised while the state lock is held, delivered after release.
type Outbox = Vec<MonitorEvent>;

struct MonitorState {
    name: String,
    description: String,
    tree: ActivityTree,
    log: MessageLog,
    last_activity_id: ActivityId,
    started_at: Option<Timestamp>,
    next_threshold: f64,
    finished: Option<ActivityResult>,
}

impl MonitorState {
    fn next_activity_id(&mut self) -> ActivityId {
        self.last_activity_id = self.last_activity_id.next();
        self.last_activity_id
    }

    /// Append to the shared log and queue `LogUpdated` for what was kept.
    fn append(&mut self, messages: Vec<LogMessage>, outbox: &mut Outbox) -> Option<LogException> {
        let outcome = self.log.add_batch(messages);
        if !outcome.is_empty() {
            outbox.push(MonitorEvent::LogUpdated {
                messages: outcome.accepted,
            });
        }
        outcome.raised
    }

    /// Log through an activity: tag with its correlation id and count
    /// errors and warnings against it. `None` if the activity is gone.
    fn append_for(
        &mut self,
        id: ActivityId,
        message: LogMessage,
        outbox: &mut Outbox,
    ) -> Option<Option<LogException>> {
        let activity = self.tree.get_mut(id)?;
        match message.message_type {
            MessageType::Error => activity.error_count = activity.error_count.saturating_add(1),
            MessageType::Warning => {
                activity.warning_count = activity.warning_count.saturating_add(1)
            }
            _ => {}
        }
        let message = message.with_correlation(id.correlation_id());
        Some(self.append(vec![message], outbox))
    }
}

struct Inner {
    task_id: TaskId,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    events: EventDispatcher,
    cancelled: AtomicBool,
}

/// Coordinates progress, logging and notifications for one task.
///
/// Cloning is cheap; clones share the same task.
///
/// # Example
///
/// ```
/// use taskmon_monitor::{NewActivity, TaskMonitor};
///
/// # fn main() -> taskmon_core::TaskResult<()> {
/// let monitor = TaskMonitor::new("Nightly import", "Loads the staging tables");
/// {
///     let load = monitor.start_activity(50.0, NewActivity::process_items("Load", 4))?;
///     for _ in 0..4 {
///         load.increment_progress()?;
///     }
///     load.end()?;
/// }
/// assert_eq!(monitor.relative_progress()?, 50.0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskMonitor {
    inner: Arc<Inner>,
}

impl TaskMonitor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::build(name.into(), description.into(), MonitorConfig::default())
    }

    /// Create a monitor with explicit configuration. The configuration is
    /// validated first.
    pub fn with_config(
        name: impl Into<String>,
        description: impl Into<String>,
        config: MonitorConfig,
    ) -> TaskResult<Self> {
        config.validate()?;
        Ok(Self::build(name.into(), description.into(), config))
    }

    fn build(name: String, description: String, config: MonitorConfig) -> Self {
        let root = ActivityId::new(1);
        let state = MonitorState {
            tree: ActivityTree::new(root, &name, &description),
            log: MessageLog::new(&config.log),
            last_activity_id: root,
            started_at: None,
            next_threshold: config.progress_notification_step,
            finished: None,
            name,
            description,
        };
        Self {
            inner: Arc::new(Inner {
                task_id: new_task_id(),
                config,
                state: Mutex::new(state),
                events: EventDispatcher::new(),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    // ========================================================================
    // PLUMBING
    // ========================================================================

    fn lock(&self) -> TaskResult<MutexGuard<'_, MonitorState>> {
        self.inner.state.lock().map_err(|_| TaskError::LockPoisoned)
    }

    /// Run `f` under the state lock, then deliver the events it queued.
    fn mutate<T, F>(&self, f: F) -> TaskResult<T>
    where
        F: FnOnce(&mut MonitorState, &mut Outbox) -> TaskResult<T>,
    {
        let result = {
            let mut state = self.lock()?;
            let mut outbox = Outbox::new();
            let result = f(&mut *state, &mut outbox);
            self.inner.events.enqueue(outbox)?;
            result
        };
        self.inner.events.flush()?;
        result
    }

    fn read<T, F>(&self, f: F) -> TaskResult<T>
    where
        F: FnOnce(&MonitorState) -> T,
    {
        Ok(f(&*self.lock()?))
    }

    fn report(&self, state: &MonitorState) -> StatusReport {
        StatusReport {
            task_id: self.inner.task_id,
            task_name: state.name.clone(),
            task_description: state.description.clone(),
            relative_progress: state.tree.relative_progress(state.tree.root()),
            error_count: state.log.error_count(),
            warning_count: state.log.warning_count(),
            is_cancelled: self.is_cancelled(),
            started_at: state.started_at,
            activities: state.tree.in_progress(),
        }
    }

    /// Advance the completion checkpoint and broadcast a fresh snapshot.
    fn progress_changed(&self, state: &mut MonitorState, outbox: &mut Outbox) {
        if state.started_at.is_some() {
            let step = self.inner.config.progress_notification_step;
            let progress = state.tree.relative_progress(state.tree.root());
            if progress + PERCENT_EPSILON >= state.next_threshold {
                state.next_threshold = ((progress + PERCENT_EPSILON) / step).floor() * step + step;
                tracing::debug!(
                    task_id = %self.inner.task_id,
                    progress,
                    next_threshold = state.next_threshold,
                    "Task completion: {:.0}%",
                    progress
                );
            }
        }
        if !self.is_cancelled() {
            outbox.push(MonitorEvent::TaskUpdated {
                report: self.report(state),
            });
        }
    }

    /// First start of the task: timestamps, lifecycle events, log entry.
    fn ensure_started(&self, state: &mut MonitorState, outbox: &mut Outbox) {
        if state.started_at.is_some() {
            return;
        }
        let now = Utc::now();
        state.started_at = Some(now);
        state.next_threshold = self.inner.config.progress_notification_step;
        outbox.push(MonitorEvent::Starting {
            task_id: self.inner.task_id,
            name: state.name.clone(),
            description: state.description.clone(),
        });
        outbox.push(MonitorEvent::Started {
            task_id: self.inner.task_id,
            started_at: now,
        });

        tracing::info!(task_id = %self.inner.task_id, name = %state.name, "Task started");
        let mut message = LogMessage::information(format!("Task '{}' started", state.name));
        if !state.description.is_empty() {
            message = message.with_details(state.description.clone());
        }
        state.append(vec![message], outbox);
    }

    /// Begin an activity and any Pending ancestors. Returns whether `id`
    /// itself changed state. With `notify` unset the caller owns the
    /// progress broadcast.
    fn begin_locked(
        &self,
        state: &mut MonitorState,
        id: ActivityId,
        notify: bool,
        outbox: &mut Outbox,
    ) -> bool {
        if !state.tree.contains(id) {
            return false;
        }
        let mut chain = state.tree.ancestors(id);
        chain.push(id);

        let mut begun = false;
        for current in chain {
            let Some(activity) = state.tree.get_mut(current) else {
                continue;
            };
            if !activity.mark_started() {
                continue;
            }
            begun = current == id;
            let depth = activity.depth;
            if depth == 0 {
                continue;
            }
            let name = activity.name.clone();

            self.ensure_started(state, outbox);
            tracing::debug!(activity_id = %current, depth, name = %name, "Activity started");
            outbox.push(MonitorEvent::ActivityStarted {
                activity_id: current,
                name: name.clone(),
                processing_level: depth,
            });
            let message = LogMessage::new(
                MessageType::ActivityStart,
                MessageLevel::for_depth(depth),
                format!("Started: {}", name),
            );
            state.append_for(current, message, outbox);
        }
        if begun && notify {
            self.progress_changed(state, outbox);
        }
        begun
    }

    /// Shared path for every progress-changing call on a leaf. Parents and
    /// completed activities are left untouched.
    fn update_locked(
        &self,
        state: &mut MonitorState,
        id: ActivityId,
        percent: Option<f64>,
        description: Option<&str>,
        outbox: &mut Outbox,
    ) -> bool {
        let pending = match state.tree.get(id) {
            None => return false,
            Some(a) if a.is_completed() || a.has_children() => return false,
            Some(a) => a.state == ExecutionState::Pending,
        };
        let begun = pending && self.begin_locked(state, id, false, outbox);
        let Some(activity) = state.tree.get_mut(id) else {
            return false;
        };

        let mut changed = false;
        if let Some(percent) = percent {
            changed |= activity.raise_progress(percent);
        }
        if let Some(description) = description {
            if activity.description != description {
                activity.description = description.to_string();
                changed = true;
            }
        }
        if changed {
            activity.touch();
        }
        if changed || begun {
            self.progress_changed(state, outbox);
        }
        changed
    }

    // ========================================================================
    // ACTIVITIES
    // ========================================================================

    /// Start a top-level activity holding `percent` of the task.
    ///
    /// The first call also starts the task itself (`Starting` / `Started`).
    pub fn start_activity(&self, percent: f64, new_activity: NewActivity) -> TaskResult<ActivityHandle> {
        let id = self.add_top_level(percent, new_activity, true)?;
        Ok(ActivityHandle::new(self.clone(), id))
    }

    /// Reserve `percent` of the task for a group of activities started
    /// later through the returned handle.
    pub fn allocate(&self, percent: f64, new_activity: NewActivity) -> TaskResult<AllocationHandle> {
        let id = self.add_top_level(percent, new_activity.into_group(), false)?;
        Ok(AllocationHandle::new(self.clone(), id))
    }

    fn add_top_level(&self, percent: f64, new_activity: NewActivity, begin: bool) -> TaskResult<ActivityId> {
        let percent = validate_percent(percent)?;
        self.mutate(|state, outbox| {
            let root = state.tree.root();
            let id = state.next_activity_id();
            let default_min = self.inner.config.default_minimum_duration;
            if !state.tree.insert_child(root, id, percent, new_activity, default_min)? {
                return Err(UsageError::TaskFinished.into());
            }
            if begin {
                self.begin_locked(state, id, true, outbox);
            }
            Ok(id)
        })
    }

    /// Register a Pending child under `parent`. Returns `None` when the
    /// parent no longer exists or has completed.
    pub fn add_child(
        &self,
        parent: ActivityId,
        percent: f64,
        new_activity: NewActivity,
    ) -> TaskResult<Option<ActivityId>> {
        let percent = validate_percent(percent)?;
        self.mutate(|state, _| {
            if !state.tree.contains(parent) {
                return Ok(None);
            }
            let id = state.next_activity_id();
            let default_min = self.inner.config.default_minimum_duration;
            let added = state
                .tree
                .insert_child(parent, id, percent, new_activity, default_min)?;
            Ok(added.then_some(id))
        })
    }

    /// Begin a Pending activity (and its Pending ancestors).
    pub fn begin_activity(&self, id: ActivityId) -> TaskResult<bool> {
        self.mutate(|state, outbox| Ok(self.begin_locked(state, id, true, outbox)))
    }

    /// Report `current` out of `total` units of work, optionally with a new
    /// description. `total <= 0` is read as 100.
    ///
    /// No-op for completed activities and for activities with children.
    pub fn update_activity(
        &self,
        id: ActivityId,
        current: f64,
        total: f64,
        description: Option<&str>,
    ) -> TaskResult<bool> {
        let percent = Activity::percent_of(current, total);
        self.mutate(|state, outbox| {
            Ok(self.update_locked(state, id, Some(percent), description, outbox))
        })
    }

    pub fn set_description(&self, id: ActivityId, description: &str) -> TaskResult<bool> {
        self.mutate(|state, outbox| {
            Ok(self.update_locked(state, id, None, Some(description), outbox))
        })
    }

    /// Set the progress of a leaf activity directly.
    ///
    /// # Errors
    ///
    /// `UsageError::ProgressOnParent` if the activity has children.
    pub fn set_progress(&self, id: ActivityId, percent: f64) -> TaskResult<bool> {
        self.mutate(|state, outbox| {
            if let Some(activity) = state.tree.get(id) {
                if activity.has_children() {
                    return Err(UsageError::ProgressOnParent { activity_id: id }.into());
                }
            }
            Ok(self.update_locked(state, id, Some(percent), None, outbox))
        })
    }

    /// Update the item counters of an activity and derive its progress from
    /// them. `None` leaves a counter unchanged.
    pub fn set_progress_counts(
        &self,
        id: ActivityId,
        current: Option<u64>,
        maximum: Option<u64>,
    ) -> TaskResult<bool> {
        self.adjust_counts(id, |activity| {
            if let Some(current) = current {
                activity.current_count = current;
            }
            if let Some(maximum) = maximum {
                activity.maximum_count = maximum;
            }
        })
    }

    /// Count one more processed item.
    pub fn increment_progress(&self, id: ActivityId) -> TaskResult<bool> {
        self.adjust_counts(id, |activity| {
            activity.current_count = activity.current_count.saturating_add(1);
        })
    }

    fn adjust_counts<F>(&self, id: ActivityId, adjust: F) -> TaskResult<bool>
    where
        F: FnOnce(&mut Activity),
    {
        self.mutate(|state, outbox| {
            let Some(activity) = state.tree.get_mut(id) else {
                return Ok(false);
            };
            if activity.is_completed() {
                return Ok(false);
            }
            adjust(activity);
            let percent =
                Activity::percent_of(activity.current_count as f64, activity.maximum_count as f64);
            Ok(self.update_locked(state, id, Some(percent), None, outbox))
        })
    }

    /// Refresh a timed activity from the wall clock.
    pub fn tick(&self, id: ActivityId) -> TaskResult<bool> {
        self.mutate(|state, outbox| {
            let timed = state
                .tree
                .get(id)
                .is_some_and(|a| matches!(a.kind, ActivityKind::TimedDuration { .. }));
            if !timed {
                return Ok(false);
            }
            let begun = self.begin_locked(state, id, false, outbox);
            let percent = state.tree.get(id).and_then(|a| a.timed_progress());
            let changed = self.update_locked(state, id, percent, None, outbox);
            if begun && !changed {
                self.progress_changed(state, outbox);
            }
            Ok(changed)
        })
    }

    /// End an activity.
    ///
    /// Children are ended first, bottom-up. An activity that has not reached
    /// 100% is forced there and recorded as terminated. If the activity has
    /// a minimum duration that has not elapsed, this call blocks for the
    /// remainder (unless the monitor is cancelled) without holding the lock.
    ///
    /// Idempotent: returns `false` if the activity was already completed or
    /// does not exist.
    pub fn end_activity(&self, id: ActivityId) -> TaskResult<bool> {
        let children = self.mutate(|state, outbox| {
            match state.tree.get(id).map(|a| a.state) {
                None | Some(ExecutionState::Completed) => return Ok(None),
                Some(ExecutionState::Pending) => {
                    self.begin_locked(state, id, true, outbox);
                }
                Some(ExecutionState::InProgress) => {}
            }
            Ok(Some(state.tree.children(id)))
        })?;
        let Some(children) = children else {
            return Ok(false);
        };

        for child in children {
            self.end_activity(child)?;
        }

        let wait = self.mutate(|state, outbox| {
            let progress = state.tree.relative_progress(id);
            let Some(activity) = state.tree.get_mut(id) else {
                return Ok(None);
            };
            if activity.is_completed() {
                return Ok(None);
            }
            if progress < FULL_PERCENT - PERCENT_EPSILON {
                activity.terminated = true;
            }
            activity.progress = FULL_PERCENT;

            let remaining = activity.remaining_minimum();
            if remaining.is_zero() || self.is_cancelled() {
                return Ok(Some(Duration::ZERO));
            }
            activity.duration_type = DurationType::Unknown;
            activity.touch();
            outbox.push(MonitorEvent::TaskUpdated {
                report: self.report(state),
            });
            Ok(Some(remaining))
        })?;
        let Some(wait) = wait else {
            return Ok(false);
        };

        if !wait.is_zero() {
            tracing::debug!(activity_id = %id, wait_ms = wait.as_millis() as u64, "Waiting out minimum duration");
            self.wait_unless_cancelled(wait);
        }

        self.mutate(|state, outbox| Ok(self.finalize_locked(state, id, outbox)))
    }

    fn wait_unless_cancelled(&self, wait: Duration) {
        let deadline = Instant::now() + wait;
        loop {
            if self.is_cancelled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(WAIT_SLICE));
        }
    }

    fn finalize_locked(&self, state: &mut MonitorState, id: ActivityId, outbox: &mut Outbox) -> bool {
        let (errors, warnings) = state.tree.subtree_counts(id);
        let Some(activity) = state.tree.get_mut(id) else {
            return false;
        };
        if activity.is_completed() {
            return false;
        }

        activity.state = ExecutionState::Completed;
        activity.result = ActivityResult::from_counts(errors, warnings);
        activity.progress = FULL_PERCENT;
        activity.duration_type = activity.kind.duration_type();
        activity.ended_at = Some(Utc::now());
        activity.touch();

        let depth = activity.depth;
        let elapsed = activity.elapsed().as_secs_f64();
        let verb = if activity.terminated { "terminated" } else { "completed" };
        let message = format!("Ended: {} ({})", activity.name, verb);
        let result = activity.result;

        tracing::debug!(activity_id = %id, %result, elapsed_secs = elapsed, "Activity {}", verb);
        if depth > 0 {
            let message = LogMessage::new(
                MessageType::ActivityEnd,
                MessageLevel::for_depth(depth),
                message,
            )
            .with_details(format!("{:.3}s, result {}", elapsed, result));
            state.append_for(id, message, outbox);
        }
        self.progress_changed(state, outbox);
        true
    }

    /// Record `message` as the activity's failure and end it.
    ///
    /// The error is logged even when the activity has already completed.
    /// Returns `false` only if the activity does not exist.
    ///
    /// # Errors
    ///
    /// Under the throw-on-error policy the logged error is returned after
    /// the activity has been ended.
    pub fn fail_activity(&self, id: ActivityId, message: &str) -> TaskResult<bool> {
        let outcome = self.mutate(|state, outbox| {
            let Some(activity) = state.tree.get_mut(id) else {
                return Ok(None);
            };
            let open = !activity.is_completed();
            if open {
                activity.status_message = Some(message.to_string());
            }
            Ok(state
                .append_for(id, LogMessage::error(message), outbox)
                .map(|raised| (open, raised)))
        })?;
        let Some((open, raised)) = outcome else {
            return Ok(false);
        };

        if open {
            self.end_activity(id)?;
        }
        match raised {
            Some(exception) => Err(TaskError::Logged(exception)),
            None => Ok(true),
        }
    }

    /// Remove an activity and its subtree. Its log messages stay.
    pub fn remove_activity(&self, id: ActivityId) -> TaskResult<bool> {
        self.mutate(|state, outbox| {
            let removed = state.tree.remove_subtree(id);
            if removed == 0 {
                return Ok(false);
            }
            tracing::debug!(activity_id = %id, removed, "Activity removed");
            self.progress_changed(state, outbox);
            Ok(true)
        })
    }

    /// Move a child to another position among its siblings.
    pub fn move_activity(&self, id: ActivityId, index: usize) -> TaskResult<bool> {
        self.mutate(|state, _| {
            let Some(parent) = state.tree.get(id).and_then(|a| a.parent) else {
                return Ok(false);
            };
            Ok(state
                .tree
                .get_mut(parent)
                .map(|p| p.children.move_to(id, index))
                .unwrap_or(false))
        })
    }

    /// Log through an activity. Returns `false` if the activity is gone.
    pub fn log_activity(&self, id: ActivityId, message: LogMessage) -> TaskResult<bool> {
        let raised = self.mutate(|state, outbox| Ok(state.append_for(id, message, outbox)))?;
        match raised {
            None => Ok(false),
            Some(None) => Ok(true),
            Some(Some(exception)) => Err(TaskError::Logged(exception)),
        }
    }

    // ========================================================================
    // TASK LIFECYCLE
    // ========================================================================

    /// Stop broadcasting progress and skip pending minimum-duration waits.
    /// Activities can still be ended. Cannot be undone.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            tracing::info!(task_id = %self.inner.task_id, "Task cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Discard every activity and start over with an empty tree. The log,
    /// name and description are kept; activity ids keep counting up, so
    /// handles from before the reset become inert.
    pub fn reset(&self) -> TaskResult<()> {
        self.mutate(|state, _| {
            let root = state.next_activity_id();
            state.tree = ActivityTree::new(root, &state.name, &state.description);
            state.started_at = None;
            state.next_threshold = self.inner.config.progress_notification_step;
            state.finished = None;
            tracing::debug!(task_id = %self.inner.task_id, %root, "Monitor reset");
            Ok(())
        })
    }

    /// End every open activity and record the task result.
    ///
    /// Raises `Finishing`, ends the root, logs `ResultSuccess` or
    /// `ResultFailure`, then raises `Finished`. Calling it again returns the
    /// recorded result without side effects.
    pub fn finish(&self) -> TaskResult<ActivityResult> {
        if let Some(result) = self.read(|state| state.finished)? {
            return Ok(result);
        }
        self.inner.events.dispatch(MonitorEvent::Finishing {
            task_id: self.inner.task_id,
        })?;

        let root = self.root_id()?;
        self.end_activity(root)?;

        self.mutate(|state, outbox| {
            if let Some(result) = state.finished {
                return Ok(result);
            }
            let result = state
                .tree
                .get(root)
                .map(|a| a.result)
                .unwrap_or(ActivityResult::Succeeded);
            state.finished = Some(result);

            let totals = format!(
                "{} error(s), {} warning(s)",
                state.log.error_count(),
                state.log.warning_count()
            );
            let message = if result.is_failure() {
                LogMessage::new(MessageType::ResultFailure, MessageLevel::Critical, "Task failed")
            } else {
                LogMessage::new(MessageType::ResultSuccess, MessageLevel::High, "Task completed")
            };
            state.append(vec![message.with_details(totals)], outbox);

            tracing::info!(task_id = %self.inner.task_id, %result, "Task finished");
            outbox.push(MonitorEvent::Finished {
                task_id: self.inner.task_id,
                result,
            });
            Ok(result)
        })
    }

    // ========================================================================
    // TASK LOG
    // ========================================================================

    pub fn log_information(&self, text: impl Into<String>) -> TaskResult<()> {
        self.log(LogMessage::information(text))
    }

    pub fn log_warning(&self, text: impl Into<String>) -> TaskResult<()> {
        self.log(LogMessage::warning(text))
    }

    pub fn log_error(&self, text: impl Into<String>) -> TaskResult<()> {
        self.log(LogMessage::error(text))
    }

    /// Append one task-level message.
    pub fn log(&self, message: LogMessage) -> TaskResult<()> {
        self.log_batch(vec![message]).map(|_| ())
    }

    /// Append task-level messages. Errors and warnings count against the
    /// task's root activity.
    ///
    /// # Errors
    ///
    /// `TaskError::Logged` under the throw-on-error / throw-on-warning
    /// policy, after listeners have seen the messages.
    pub fn log_batch(&self, messages: Vec<LogMessage>) -> TaskResult<Vec<LogMessage>> {
        let (accepted, raised) = self.mutate(|state, outbox| {
            let root = state.tree.root();
            if let Some(root) = state.tree.get_mut(root) {
                for message in &messages {
                    match message.message_type {
                        MessageType::Error => root.error_count = root.error_count.saturating_add(1),
                        MessageType::Warning => {
                            root.warning_count = root.warning_count.saturating_add(1)
                        }
                        _ => {}
                    }
                }
            }
            let outcome = state.log.add_batch(messages);
            if !outcome.is_empty() {
                outbox.push(MonitorEvent::LogUpdated {
                    messages: outcome.accepted.clone(),
                });
            }
            Ok((outcome.accepted, outcome.raised))
        })?;
        match raised {
            Some(exception) => Err(TaskError::Logged(exception)),
            None => Ok(accepted),
        }
    }

    pub fn messages(&self) -> TaskResult<Vec<LogMessage>> {
        self.read(|state| state.log.messages())
    }

    pub fn warnings(&self) -> TaskResult<Vec<LogMessage>> {
        self.read(|state| state.log.warnings())
    }

    pub fn errors(&self) -> TaskResult<Vec<LogMessage>> {
        self.read(|state| state.log.errors())
    }

    pub fn results(&self) -> TaskResult<Vec<LogMessage>> {
        self.read(|state| state.log.results())
    }

    pub fn exceptions(&self) -> TaskResult<Vec<LogMessage>> {
        self.read(|state| state.log.exceptions())
    }

    /// Messages logged through one activity.
    pub fn messages_for(&self, id: ActivityId) -> TaskResult<Vec<LogMessage>> {
        self.read(|state| state.log.by_correlation(&id.correlation_id()))
    }

    pub fn messages_since(&self, sequence: Sequence) -> TaskResult<Vec<LogMessage>> {
        self.read(|state| state.log.since(sequence))
    }

    /// Logged errors (optionally with warnings) folded into one chain.
    pub fn exception(&self, include_warnings: bool) -> TaskResult<Option<LogException>> {
        self.read(|state| state.log.exception(include_warnings))
    }

    pub fn error_count(&self) -> TaskResult<u64> {
        self.read(|state| state.log.error_count())
    }

    pub fn warning_count(&self) -> TaskResult<u64> {
        self.read(|state| state.log.warning_count())
    }

    pub fn set_throw_on_error(&self, enabled: bool) -> TaskResult<()> {
        self.mutate(|state, _| {
            state.log.set_throw_on_error(enabled);
            Ok(())
        })
    }

    pub fn set_throw_on_warning(&self, enabled: bool) -> TaskResult<()> {
        self.mutate(|state, _| {
            state.log.set_throw_on_warning(enabled);
            Ok(())
        })
    }

    pub fn set_log_filter(&self, filter: MessageFilter) -> TaskResult<()> {
        self.mutate(|state, _| {
            state.log.set_filter(filter);
            Ok(())
        })
    }

    /// Change the log capacity; shrinking evicts immediately.
    pub fn set_log_buffer_size(&self, buffer_size: i64) -> TaskResult<usize> {
        self.mutate(|state, _| Ok(state.log.set_buffer_size(buffer_size)))
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    pub fn subscribe(&self, listener: Arc<dyn MonitorListener>) -> TaskResult<SubscriptionId> {
        self.inner.events.subscribe(listener)
    }

    pub fn subscribe_fn<F>(&self, f: F) -> TaskResult<SubscriptionId>
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnListener::new(f)))
    }

    /// Receive events through a `tokio` broadcast channel. A receiver more
    /// than `capacity` events behind skips ahead.
    pub fn subscribe_channel(
        &self,
        capacity: usize,
    ) -> TaskResult<broadcast::Receiver<MonitorEvent>> {
        let (listener, rx) = BroadcastListener::new(capacity);
        self.subscribe(Arc::new(listener))?;
        Ok(rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> TaskResult<bool> {
        self.inner.events.unsubscribe(id)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Snapshot of overall progress, log totals and every in-progress
    /// activity (depth-first, root excluded).
    pub fn status_report(&self) -> TaskResult<StatusReport> {
        let state = self.lock()?;
        Ok(self.report(&state))
    }

    pub fn task_id(&self) -> TaskId {
        self.inner.task_id
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn name(&self) -> TaskResult<String> {
        self.read(|state| state.name.clone())
    }

    pub fn description(&self) -> TaskResult<String> {
        self.read(|state| state.description.clone())
    }

    pub fn root_id(&self) -> TaskResult<ActivityId> {
        self.read(|state| state.tree.root())
    }

    pub fn activity(&self, id: ActivityId) -> TaskResult<Option<ActivitySnapshot>> {
        self.read(|state| state.tree.snapshot(id))
    }

    pub fn children(&self, id: ActivityId) -> TaskResult<Vec<ActivityId>> {
        self.read(|state| state.tree.children(id))
    }

    pub fn activity_count(&self) -> TaskResult<usize> {
        self.read(|state| state.tree.len())
    }

    /// Overall task progress, 0-100.
    pub fn relative_progress(&self) -> TaskResult<f64> {
        self.read(|state| state.tree.relative_progress(state.tree.root()))
    }

    pub fn activity_progress(&self, id: ActivityId) -> TaskResult<Option<f64>> {
        self.read(|state| {
            state
                .tree
                .contains(id)
                .then(|| state.tree.relative_progress(id))
        })
    }

    /// Overall progress at which the next completion checkpoint is recorded.
    pub fn next_progress_threshold(&self) -> TaskResult<f64> {
        self.read(|state| state.next_threshold)
    }

    pub fn started_at(&self) -> TaskResult<Option<Timestamp>> {
        self.read(|state| state.started_at)
    }

    pub fn result(&self) -> TaskResult<Option<ActivityResult>> {
        self.read(|state| state.finished)
    }
}

impl std::fmt::Debug for TaskMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskMonitor")
            .field("task_id", &self.inner.task_id)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorder(monitor: &TaskMonitor) -> Arc<StdMutex<Vec<MonitorEvent>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        monitor
            .subscribe_fn(move |e| sink.lock().unwrap().push(e.clone()))
            .unwrap();
        seen
    }

    fn types(events: &[MonitorEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type()).collect()
    }

    #[test]
    fn test_first_start_raises_lifecycle_events_once() {
        let monitor = TaskMonitor::new("import", "nightly");
        let seen = recorder(&monitor);

        let a = monitor.start_activity(50.0, NewActivity::group("A")).unwrap();
        let b = monitor.start_activity(50.0, NewActivity::group("B")).unwrap();

        let events = seen.lock().unwrap();
        let names = types(&events);
        assert_eq!(&names[..2], &["Starting", "Started"]);
        assert_eq!(names.iter().filter(|n| **n == "Started").count(), 1);
        assert_eq!(names.iter().filter(|n| **n == "ActivityStarted").count(), 2);
        drop(events);
        assert!(monitor.started_at().unwrap().is_some());
        a.end().unwrap();
        b.end().unwrap();
    }

    #[test]
    fn test_activity_ids_are_monotonic() {
        let monitor = TaskMonitor::new("t", "");
        let root = monitor.root_id().unwrap();
        let a = monitor.start_activity(0.0, NewActivity::group("A")).unwrap();
        let b = monitor.start_activity(0.0, NewActivity::group("B")).unwrap();
        assert!(root < a.id() && a.id() < b.id());
    }

    #[test]
    fn test_set_progress_on_parent_is_usage_error() {
        let monitor = TaskMonitor::new("t", "");
        let parent = monitor.start_activity(100.0, NewActivity::group("P")).unwrap();
        let _child = parent
            .start_child(0.0, NewActivity::group("C"))
            .unwrap()
            .unwrap();

        let err = parent.set_progress(50.0).unwrap_err();
        assert!(matches!(
            err,
            TaskError::Usage(UsageError::ProgressOnParent { activity_id }) if activity_id == parent.id()
        ));
    }

    #[test]
    fn test_invalid_percent_rejected() {
        let monitor = TaskMonitor::new("t", "");
        let err = monitor
            .start_activity(-10.0, NewActivity::group("A"))
            .unwrap_err();
        assert!(err.is_usage());
        assert_eq!(monitor.activity_count().unwrap(), 1);
    }

    #[test]
    fn test_update_is_monotonic() {
        let monitor = TaskMonitor::new("t", "");
        let a = monitor.start_activity(100.0, NewActivity::group("A")).unwrap();
        assert!(a.update(6.0, 10.0, None).unwrap());
        assert!(!a.update(3.0, 10.0, None).unwrap());
        assert_eq!(monitor.activity_progress(a.id()).unwrap(), Some(60.0));
        assert!(a.update(3.0, 10.0, Some("rewinding")).unwrap());
        assert_eq!(monitor.activity_progress(a.id()).unwrap(), Some(60.0));
    }

    #[test]
    fn test_threshold_advances_past_progress() {
        let monitor = TaskMonitor::new("t", "");
        let a = monitor.start_activity(100.0, NewActivity::group("A")).unwrap();
        assert_eq!(monitor.next_progress_threshold().unwrap(), 10.0);
        a.set_progress(5.0).unwrap();
        assert_eq!(monitor.next_progress_threshold().unwrap(), 10.0);
        a.set_progress(37.0).unwrap();
        assert_eq!(monitor.next_progress_threshold().unwrap(), 40.0);
        a.set_progress(40.0).unwrap();
        assert_eq!(monitor.next_progress_threshold().unwrap(), 50.0);
    }

    #[test]
    fn test_cancel_suppresses_task_updated() {
        let monitor = TaskMonitor::new("t", "");
        let a = monitor.start_activity(100.0, NewActivity::group("A")).unwrap();
        let seen = recorder(&monitor);
        monitor.cancel();
        monitor.cancel();
        assert!(monitor.is_cancelled());

        a.set_progress(50.0).unwrap();
        assert!(a.end().unwrap());
        let events = seen.lock().unwrap();
        assert!(!types(&events).contains(&"TaskUpdated"));
        assert!(types(&events).contains(&"LogUpdated"));
    }

    #[test]
    fn test_end_terminated_when_short() {
        let monitor = TaskMonitor::new("t", "");
        let a = monitor.start_activity(100.0, NewActivity::group("A")).unwrap();
        a.set_progress(30.0).unwrap();
        let id = a.id();
        assert!(a.end().unwrap());

        let snapshot = monitor.activity(id).unwrap().unwrap();
        assert!(snapshot.terminated);
        assert_eq!(snapshot.relative_progress, 100.0);
        assert_eq!(snapshot.result, ActivityResult::Succeeded);
    }

    #[test]
    fn test_end_is_idempotent() {
        let monitor = TaskMonitor::new("t", "");
        let a = monitor.start_activity(100.0, NewActivity::group("A")).unwrap();
        let id = a.id();
        assert!(monitor.end_activity(id).unwrap());
        assert!(!monitor.end_activity(id).unwrap());
        drop(a);

        let ends = monitor
            .messages_for(id)
            .unwrap()
            .into_iter()
            .filter(|m| m.message_type == MessageType::ActivityEnd)
            .count();
        assert_eq!(ends, 1);
    }

    #[test]
    fn test_fail_marks_failed() {
        let monitor = TaskMonitor::new("t", "");
        let a = monitor.start_activity(100.0, NewActivity::group("A")).unwrap();
        let id = a.id();
        assert!(a.fail("disk full").unwrap());

        let snapshot = monitor.activity(id).unwrap().unwrap();
        assert_eq!(snapshot.result, ActivityResult::Failed);
        assert_eq!(snapshot.status_message.as_deref(), Some("disk full"));
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(monitor.error_count().unwrap(), 1);
    }

    #[test]
    fn test_warning_gives_completed_with_warnings() {
        let monitor = TaskMonitor::new("t", "");
        let a = monitor.start_activity(100.0, NewActivity::group("A")).unwrap();
        let id = a.id();
        a.log_warning("slow disk").unwrap();
        a.end().unwrap();
        assert_eq!(
            monitor.activity(id).unwrap().unwrap().result,
            ActivityResult::CompletedWithWarnings
        );
    }

    #[test]
    fn test_finish_is_idempotent() {
        let monitor = TaskMonitor::new("t", "");
        let seen = recorder(&monitor);
        let _a = monitor.start_activity(100.0, NewActivity::group("A")).unwrap();

        assert_eq!(monitor.finish().unwrap(), ActivityResult::Succeeded);
        assert_eq!(monitor.finish().unwrap(), ActivityResult::Succeeded);

        let events = seen.lock().unwrap();
        let names = types(&events);
        assert_eq!(names.iter().filter(|n| **n == "Finished").count(), 1);
        assert_eq!(names.last(), Some(&"Finished"));
        assert_eq!(monitor.results().unwrap().len(), 1);
    }

    #[test]
    fn test_start_after_finish_requires_reset() {
        let monitor = TaskMonitor::new("t", "");
        monitor.finish().unwrap();
        let err = monitor.start_activity(10.0, NewActivity::group("late")).unwrap_err();
        assert!(matches!(err, TaskError::Usage(UsageError::TaskFinished)));

        monitor.reset().unwrap();
        assert!(monitor.start_activity(10.0, NewActivity::group("again")).is_ok());
    }

    #[test]
    fn test_with_config_validates() {
        let config = MonitorConfig {
            progress_notification_step: 0.0,
            ..MonitorConfig::default()
        };
        assert!(TaskMonitor::with_config("t", "", config).is_err());
    }

    #[test]
    fn test_remove_activity_reallocates() {
        let monitor = TaskMonitor::new("t", "");
        let a = monitor.start_activity(0.0, NewActivity::group("A")).unwrap();
        let b = monitor.start_activity(0.0, NewActivity::group("B")).unwrap();
        a.set_progress(100.0).unwrap();
        assert_eq!(monitor.relative_progress().unwrap(), 50.0);

        assert!(monitor.remove_activity(b.id()).unwrap());
        assert_eq!(monitor.relative_progress().unwrap(), 100.0);
        assert!(!b.set_progress(10.0).unwrap());
        assert!(!monitor.remove_activity(monitor.root_id().unwrap()).unwrap());
    }
}
