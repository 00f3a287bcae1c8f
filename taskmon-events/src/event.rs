//! Monitor event types
//!
//! Every state change a monitor wants the outside world to see is raised
//! as one of these events. Events are plain data; listeners receive them by
//! reference, in the order the monitor raised them.

use serde::{Deserialize, Serialize};
use taskmon_core::{
    ActivityId, ActivityResult, LogMessage, StatusReport, TaskId, Timestamp,
};

/// Event raised by a task monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type")]
pub enum MonitorEvent {
    // ========================================================================
    // TASK LIFECYCLE
    // ========================================================================
    /// The first activity of the task is about to start.
    Starting {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        task_id: TaskId,
        name: String,
        description: String,
    },

    /// The task has started.
    Started {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        task_id: TaskId,
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
        started_at: Timestamp,
    },

    /// `finish()` was called; remaining activities are being closed.
    Finishing {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        task_id: TaskId,
    },

    /// The task is finished.
    Finished {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        task_id: TaskId,
        result: ActivityResult,
    },

    // ========================================================================
    // ACTIVITY / PROGRESS
    // ========================================================================
    /// An activity moved from Pending to InProgress.
    ActivityStarted {
        activity_id: ActivityId,
        name: String,
        processing_level: u32,
    },

    /// Progress or descriptive state changed somewhere in the task.
    TaskUpdated { report: StatusReport },

    // ========================================================================
    // LOG
    // ========================================================================
    /// Messages were accepted by the task log, in sequence order.
    LogUpdated { messages: Vec<LogMessage> },
}

impl MonitorEvent {
    /// Get the event type name for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            MonitorEvent::Starting { .. } => "Starting",
            MonitorEvent::Started { .. } => "Started",
            MonitorEvent::Finishing { .. } => "Finishing",
            MonitorEvent::Finished { .. } => "Finished",
            MonitorEvent::ActivityStarted { .. } => "ActivityStarted",
            MonitorEvent::TaskUpdated { .. } => "TaskUpdated",
            MonitorEvent::LogUpdated { .. } => "LogUpdated",
        }
    }

    /// Task lifecycle events (as opposed to progress and log traffic).
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            MonitorEvent::Starting { .. }
                | MonitorEvent::Started { .. }
                | MonitorEvent::Finishing { .. }
                | MonitorEvent::Finished { .. }
        )
    }

    /// The status snapshot carried by a `TaskUpdated` event.
    pub fn report(&self) -> Option<&StatusReport> {
        match self {
            MonitorEvent::TaskUpdated { report } => Some(report),
            _ => None,
        }
    }

    /// The messages carried by a `LogUpdated` event.
    pub fn messages(&self) -> &[LogMessage] {
        match self {
            MonitorEvent::LogUpdated { messages } => messages,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmon_core::new_task_id;

    #[test]
    fn test_event_type_names() {
        let task_id = new_task_id();
        assert_eq!(MonitorEvent::Finishing { task_id }.event_type(), "Finishing");
        assert_eq!(
            MonitorEvent::LogUpdated { messages: vec![] }.event_type(),
            "LogUpdated"
        );
        assert!(MonitorEvent::Finishing { task_id }.is_lifecycle());
        assert!(!MonitorEvent::LogUpdated { messages: vec![] }.is_lifecycle());
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let event = MonitorEvent::ActivityStarted {
            activity_id: ActivityId::new(3),
            name: "Load".to_string(),
            processing_level: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ActivityStarted");
        assert_eq!(json["activity_id"], 3);

        let back: MonitorEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_messages_accessor() {
        let event = MonitorEvent::LogUpdated {
            messages: vec![LogMessage::information("hello")],
        };
        assert_eq!(event.messages().len(), 1);
        assert!(event.report().is_none());
        assert!(MonitorEvent::Finishing { task_id: new_task_id() }.messages().is_empty());
    }
}
