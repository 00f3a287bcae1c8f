//! TASKMON Test Utilities
//!
//! Centralized test infrastructure for the TASKMON workspace:
//! - Proptest generators for messages, levels and allocation requests
//! - Test fixtures for common monitor setups
//! - A recording listener that captures monitor events
//! - Custom assertions for TASKMON-specific validation

// Re-export core types for convenience
pub use taskmon_core::{
    ActivityId, ActivityResult, LogConfig, LogMessage, MessageLevel, MessageType, MonitorConfig,
    StatusReport, TaskError, TaskResult, Timestamp, UsageError, FULL_PERCENT,
};
pub use taskmon_events::{MonitorEvent, MonitorListener};
pub use taskmon_monitor::{NewActivity, TaskMonitor};

use chrono::Utc;
use std::sync::{Arc, Mutex};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating TASKMON values.

    use super::*;
    use proptest::prelude::*;

    // === Enum Generators ===

    /// Generate a MessageLevel variant.
    pub fn arb_message_level() -> impl Strategy<Value = MessageLevel> {
        prop_oneof![
            Just(MessageLevel::Low),
            Just(MessageLevel::Normal),
            Just(MessageLevel::High),
            Just(MessageLevel::Critical),
        ]
    }

    /// Generate a MessageType variant.
    pub fn arb_message_type() -> impl Strategy<Value = MessageType> {
        proptest::sample::select(MessageType::ALL.to_vec())
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    // === Struct Generators ===

    /// Generate an unsequenced LogMessage.
    pub fn arb_log_message() -> impl Strategy<Value = LogMessage> {
        (
            arb_message_type(),
            arb_message_level(),
            "[a-z ]{1,24}",
            proptest::option::of("[a-z0-9]{1,12}"),
            proptest::option::of(1u64..50),
        )
            .prop_map(|(message_type, level, text, details, activity)| {
                let mut message = LogMessage::new(message_type, level, text);
                if let Some(details) = details {
                    message = message.with_details(details);
                }
                if let Some(raw) = activity {
                    message = message.with_correlation(ActivityId::new(raw).correlation_id());
                }
                message
            })
    }

    /// Generate one allocation request: soft (0) or a hard share.
    pub fn arb_allocation_request() -> impl Strategy<Value = f64> {
        prop_oneof![
            1 => Just(0.0),
            2 => 0.5f64..120.0,
        ]
    }

    /// Generate a set of sibling allocation requests.
    pub fn arb_allocation_requests(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(arb_allocation_request(), 1..=max_len.max(1))
    }

    /// Generate a sequence of progress values to report on one activity.
    pub fn arb_progress_updates() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(-10.0f64..130.0, 1..20)
    }

    /// Generate a valid log configuration.
    pub fn arb_log_config() -> impl Strategy<Value = LogConfig> {
        (-5i64..64, arb_message_level()).prop_map(|(buffer_size, minimum_level)| LogConfig {
            buffer_size,
            minimum_level,
            ..LogConfig::default()
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use std::time::Duration;

    /// Configuration with an unbounded log and no waits.
    pub fn quiet_config() -> MonitorConfig {
        MonitorConfig {
            log: LogConfig::unbounded(),
            default_minimum_duration: Duration::ZERO,
            ..MonitorConfig::default()
        }
    }

    /// Configuration whose log raises every logged error.
    pub fn throwing_config() -> MonitorConfig {
        MonitorConfig {
            log: LogConfig {
                throw_on_error: true,
                ..LogConfig::unbounded()
            },
            ..quiet_config()
        }
    }

    /// A fresh monitor with [`quiet_config`].
    pub fn monitor() -> TaskMonitor {
        named_monitor("Test task")
    }

    pub fn named_monitor(name: &str) -> TaskMonitor {
        match TaskMonitor::with_config(name, "fixture", quiet_config()) {
            Ok(monitor) => monitor,
            Err(e) => panic!("fixture config rejected: {}", e),
        }
    }

    /// A monitor with a [`RecordingListener`] already attached.
    pub fn recorded_monitor() -> (TaskMonitor, RecordingListener) {
        let monitor = monitor();
        let recorder = RecordingListener::new();
        if let Err(e) = monitor.subscribe(Arc::new(recorder.clone())) {
            panic!("subscribe failed: {}", e);
        }
        (monitor, recorder)
    }

    /// A message that already carries a sequence number.
    pub fn sequenced(message: LogMessage, sequence: u64) -> LogMessage {
        LogMessage {
            sequence,
            ..message
        }
    }
}

// ============================================================================
// RECORDING LISTENER
// ============================================================================

/// Captures every event it receives. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<MonitorEvent>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event received so far.
    pub fn events(&self) -> Vec<MonitorEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Event type names in arrival order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event_type()).collect()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.event_types()
            .into_iter()
            .filter(|t| *t == event_type)
            .count()
    }

    /// Every message delivered through `LogUpdated`, in order.
    pub fn logged_messages(&self) -> Vec<LogMessage> {
        self.events()
            .iter()
            .flat_map(|e| e.messages().to_vec())
            .collect()
    }

    /// Every report delivered through `TaskUpdated`, in order.
    pub fn reports(&self) -> Vec<StatusReport> {
        self.events()
            .iter()
            .filter_map(|e| e.report().cloned())
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl MonitorListener for RecordingListener {
    fn on_event(&self, event: &MonitorEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for TASKMON-specific validation.

    use super::*;

    /// Assert that a TaskResult is a usage error.
    #[track_caller]
    pub fn assert_usage_error<T: std::fmt::Debug>(result: &TaskResult<T>) {
        match result {
            Err(TaskError::Usage(_)) => {}
            other => panic!("Expected Usage error, got: {:?}", other),
        }
    }

    /// Assert that a TaskResult is a specific usage error.
    #[track_caller]
    pub fn assert_usage_error_is<T: std::fmt::Debug>(result: &TaskResult<T>, expected: &UsageError) {
        match result {
            Err(TaskError::Usage(e)) => assert_eq!(e, expected, "Wrong usage error"),
            other => panic!("Expected Usage error {:?}, got: {:?}", expected, other),
        }
    }

    /// Assert that a TaskResult is a logged error raised with `message`.
    #[track_caller]
    pub fn assert_logged_error<T: std::fmt::Debug>(result: &TaskResult<T>, message: &str) {
        match result {
            Err(TaskError::Logged(exception)) => {
                assert_eq!(exception.message, message, "Wrong logged message");
            }
            other => panic!("Expected Logged error '{}', got: {:?}", message, other),
        }
    }

    /// Assert that allocations sum to 100 within tolerance.
    #[track_caller]
    pub fn assert_allocations_sum_to_100(allocations: &[f64]) {
        let total: f64 = allocations.iter().sum();
        assert!(
            (total - FULL_PERCENT).abs() < 1e-6,
            "Allocations {:?} sum to {}, expected 100",
            allocations,
            total
        );
    }

    /// Assert that a progress value is within `1e-6` of `expected`.
    #[track_caller]
    pub fn assert_progress_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "Progress {} differs from expected {}",
            actual,
            expected
        );
    }

    /// Assert that sequence numbers strictly increase.
    #[track_caller]
    pub fn assert_strictly_increasing(messages: &[LogMessage]) {
        for pair in messages.windows(2) {
            assert!(
                pair[0].sequence < pair[1].sequence,
                "Sequence {} not below {}",
                pair[0].sequence,
                pair[1].sequence
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
