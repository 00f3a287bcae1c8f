//! Task log message types

use crate::{MessageLevel, MessageType, Sequence, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single entry in the task log.
///
/// Sequence numbers are assigned by the log when the message is accepted;
/// a sequence of `0` means the message has not been appended yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LogMessage {
    pub sequence: Sequence,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub timestamp: Timestamp,
    pub message_type: MessageType,
    pub level: MessageLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Associates the message with the activity (or other unit) that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_code: Option<String>,
}

impl LogMessage {
    /// Create an unsequenced message stamped with the current time.
    pub fn new(message_type: MessageType, level: MessageLevel, message: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            message_type,
            level,
            message: message.into(),
            details: None,
            correlation_id: None,
            content_code: None,
        }
    }

    pub fn information(message: impl Into<String>) -> Self {
        Self::new(MessageType::Information, MessageLevel::Normal, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(MessageType::Warning, MessageLevel::High, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(MessageType::Error, MessageLevel::Critical, message)
    }

    pub fn with_level(mut self, level: MessageLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_content_code(mut self, code: impl Into<String>) -> Self {
        self.content_code = Some(code.into());
        self
    }

    pub fn is_sequenced(&self) -> bool {
        self.sequence > 0
    }

    pub fn is_error(&self) -> bool {
        self.message_type == MessageType::Error
    }

    pub fn is_warning(&self) -> bool {
        self.message_type == MessageType::Warning
    }

    pub fn has_correlation(&self, correlation_id: &str) -> bool {
        self.correlation_id.as_deref() == Some(correlation_id)
    }
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}/{}] {}",
            self.sequence, self.message_type, self.level, self.message
        )?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

// ============================================================================
// LOG EXCEPTION CHAIN
// ============================================================================

/// An error synthesized from one or more logged messages.
///
/// Chains are nested: `source()` walks from the newest message toward the
/// oldest, which sits at the innermost position.
#[derive(Debug, Clone, PartialEq)]
pub struct LogException {
    pub message: String,
    pub message_type: MessageType,
    pub sequence: Sequence,
    inner: Option<Box<LogException>>,
}

impl LogException {
    /// Create a single-link exception from a message.
    pub fn from_message(message: &LogMessage) -> Self {
        Self {
            message: message.message.clone(),
            message_type: message.message_type,
            sequence: message.sequence,
            inner: None,
        }
    }

    /// Wrap an older exception as the inner cause of this one.
    pub fn with_inner(mut self, inner: LogException) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    pub fn inner(&self) -> Option<&LogException> {
        self.inner.as_deref()
    }

    /// Number of links in the chain, including this one.
    pub fn depth(&self) -> usize {
        self.chain().count()
    }

    /// Iterate the chain from this (newest) link to the innermost (oldest).
    pub fn chain(&self) -> impl Iterator<Item = &LogException> {
        std::iter::successors(Some(self), |e| e.inner())
    }

    /// The innermost (oldest) link.
    pub fn root_cause(&self) -> &LogException {
        self.chain().last().unwrap_or(self)
    }
}

impl fmt::Display for LogException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LogException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
