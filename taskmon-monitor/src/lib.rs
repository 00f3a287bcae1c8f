//! TASKMON Monitor - Hierarchical Progress Tracking
//!
//! A task is a tree of activities. Each activity claims a share of its
//! parent's progress; a parent's progress is the allocation-weighted sum of
//! its children's. One [`TaskMonitor`] per task owns the tree, the shared
//! message log and the listener registry.
//!
//! ```text
//! TaskMonitor
//!   └─ root (Group, 0-100)
//!        ├─ "Extract"   60%  ─┬─ "Tables"  50%
//!        │                    └─ "Views"   soft → 50%
//!        └─ "Load"      soft → 40%
//! ```
//!
//! Callers hold [`ActivityHandle`]s and [`AllocationHandle`]s, which end
//! their activity when dropped.

mod activity;
mod allocation;
mod handle;
mod monitor;
mod tree;

pub use activity::{ActivitySnapshot, NewActivity};
pub use allocation::{allocate, validate_percent, ActivityCollection, Allocation};
pub use handle::{ActivityHandle, AllocationHandle};
pub use monitor::TaskMonitor;

// Re-export the types that appear in the monitor's API.
pub use taskmon_core::{
    ActivityId, ActivityKind, ActivityResult, ActivityStatus, DurationType, ExecutionState,
    LogConfig, LogException, LogMessage, MessageLevel, MessageType, MonitorConfig, StatusReport,
    TaskError, TaskId, TaskResult, UsageError,
};
pub use taskmon_events::{
    broadcast, BroadcastListener, FnListener, MonitorEvent, MonitorListener, SubscriptionId,
};
pub use taskmon_log::MessageFilter;
