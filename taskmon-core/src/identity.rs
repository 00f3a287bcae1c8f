//! Identity types for TASKMON entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of one task run (one monitor).
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type TaskId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Monotonic sequence number assigned to log messages.
pub type Sequence = u64;

/// Prefix used when an activity id is rendered as a message correlation id.
const CORRELATION_PREFIX: &str = "activity-";

/// Generate a new UUIDv7 TaskId (timestamp-sortable).
pub fn new_task_id() -> TaskId {
    Uuid::now_v7()
}

/// Identifier of an activity inside one monitor.
///
/// IDs are handed out by the owning monitor in call order and are never
/// reused, not even after the activity tree is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct ActivityId(u64);

impl ActivityId {
    /// Wrap a raw id value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value.
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// The id that follows this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Correlation id attached to every message logged through this activity.
    pub fn correlation_id(&self) -> String {
        format!("{}{}", CORRELATION_PREFIX, self.0)
    }

    /// Recover an activity id from a correlation id produced by
    /// [`ActivityId::correlation_id`].
    pub fn from_correlation_id(correlation_id: &str) -> Option<Self> {
        correlation_id
            .strip_prefix(CORRELATION_PREFIX)
            .and_then(|raw| raw.parse().ok())
            .map(Self)
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActivityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u64> for ActivityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
