//! The shared task message log.

use crate::{build_exception, MessageFilter};
use chrono::Utc;
use std::collections::VecDeque;
use taskmon_core::{
    LogConfig, LogException, LogMessage, MessageType, Sequence, TaskError, TaskResult,
};

/// Result of appending messages to a [`MessageLog`].
///
/// The owner of the log is responsible for announcing `accepted` to
/// listeners and then surfacing `raised` to the caller, in that order.
#[derive(Debug, Clone, Default)]
pub struct AppendOutcome {
    /// Messages that passed the filter, with sequence numbers assigned.
    pub accepted: Vec<LogMessage>,
    /// Number of buffered messages evicted to stay within capacity.
    pub evicted: usize,
    /// Exception triggered by the throw-on-error / throw-on-warning policy.
    pub raised: Option<LogException>,
}

impl AppendOutcome {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    /// Surface the throw policy as a `Result`.
    pub fn into_result(self) -> TaskResult<Vec<LogMessage>> {
        match self.raised {
            Some(exception) => Err(TaskError::Logged(exception)),
            None => Ok(self.accepted),
        }
    }
}

/// Append-only, capacity-bounded buffer of task log messages.
///
/// Sequence numbers start at 1, follow arrival order and are never reused,
/// even after the oldest entries are evicted. Error and warning totals are
/// running counters and do not shrink when messages leave the buffer.
///
/// The log itself does no locking; owners that share it across threads wrap
/// append, eviction and notification in one critical section.
#[derive(Debug, Clone)]
pub struct MessageLog {
    buffer: VecDeque<LogMessage>,
    filter: MessageFilter,
    buffer_size: i64,
    throw_on_error: bool,
    throw_on_warning: bool,
    next_sequence: Sequence,
    error_count: u64,
    warning_count: u64,
}

impl MessageLog {
    pub fn new(config: &LogConfig) -> Self {
        Self {
            buffer: VecDeque::new(),
            filter: MessageFilter::from_config(config),
            buffer_size: config.buffer_size,
            throw_on_error: config.throw_on_error,
            throw_on_warning: config.throw_on_warning,
            next_sequence: 1,
            error_count: 0,
            warning_count: 0,
        }
    }

    /// A log with no capacity limit and no filtering.
    pub fn unbounded() -> Self {
        Self::new(&LogConfig::unbounded())
    }

    // === Configuration ===

    pub fn buffer_size(&self) -> i64 {
        self.buffer_size
    }

    /// Change the capacity; shrinking evicts the oldest entries immediately.
    pub fn set_buffer_size(&mut self, buffer_size: i64) -> usize {
        self.buffer_size = buffer_size;
        self.evict()
    }

    pub fn filter(&self) -> &MessageFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: MessageFilter) {
        self.filter = filter;
    }

    pub fn throw_on_error(&self) -> bool {
        self.throw_on_error
    }

    pub fn set_throw_on_error(&mut self, enabled: bool) {
        self.throw_on_error = enabled;
    }

    pub fn throw_on_warning(&self) -> bool {
        self.throw_on_warning
    }

    pub fn set_throw_on_warning(&mut self, enabled: bool) {
        self.throw_on_warning = enabled;
    }

    // === Appending ===

    /// Append one message.
    pub fn add(&mut self, message: LogMessage) -> AppendOutcome {
        self.add_batch(std::iter::once(message))
    }

    /// Append a batch of messages.
    ///
    /// Filtered messages are dropped without consuming a sequence number.
    /// Survivors are sequenced, time-stamped if needed, counted and appended;
    /// then the buffer is trimmed to capacity, oldest first.
    pub fn add_batch<I>(&mut self, messages: I) -> AppendOutcome
    where
        I: IntoIterator<Item = LogMessage>,
    {
        let mut accepted = Vec::new();

        for mut message in messages {
            if !self.filter.accepts(&message) {
                tracing::trace!(message_type = %message.message_type, level = %message.level, "Log message filtered");
                continue;
            }

            message.sequence = self.next_sequence;
            self.next_sequence += 1;
            if message.timestamp.timestamp() == 0 {
                message.timestamp = Utc::now();
            }

            match message.message_type {
                MessageType::Error => self.error_count += 1,
                MessageType::Warning => self.warning_count += 1,
                _ => {}
            }

            tracing::trace!(sequence = message.sequence, message_type = %message.message_type, "Log message appended");
            self.buffer.push_back(message.clone());
            accepted.push(message);
        }

        let evicted = self.evict();
        let raised = self.raised_by(&accepted);

        AppendOutcome {
            accepted,
            evicted,
            raised,
        }
    }

    fn evict(&mut self) -> usize {
        if self.buffer_size <= 0 {
            return 0;
        }
        let capacity = self.buffer_size as usize;
        let excess = self.buffer.len().saturating_sub(capacity);
        self.buffer.drain(..excess);
        excess
    }

    /// Messages in `batch` that trip the throw policy, folded into one chain.
    fn raised_by(&self, batch: &[LogMessage]) -> Option<LogException> {
        if !self.throw_on_error && !self.throw_on_warning {
            return None;
        }
        let triggering: Vec<LogMessage> = batch
            .iter()
            .filter(|m| {
                (self.throw_on_error && m.is_error()) || (self.throw_on_warning && m.is_warning())
            })
            .cloned()
            .collect();
        build_exception(&triggering)
    }

    // === Removal ===

    /// Remove every buffered message carrying the given correlation id.
    /// Counters are not rewound.
    pub fn purge_correlation(&mut self, correlation_id: &str) -> usize {
        let before = self.buffer.len();
        self.buffer.retain(|m| !m.has_correlation(correlation_id));
        before - self.buffer.len()
    }

    /// Empty the buffer. Sequence numbers and totals carry on.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    // === Counters ===

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn warning_count(&self) -> u64 {
        self.warning_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Sequence number of the most recently accepted message, 0 if none.
    pub fn last_sequence(&self) -> Sequence {
        self.next_sequence - 1
    }

    // === Queries (all return snapshots) ===

    pub fn messages(&self) -> Vec<LogMessage> {
        self.buffer.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&LogMessage> {
        self.buffer.back()
    }

    pub fn warnings(&self) -> Vec<LogMessage> {
        self.select(|m| m.is_warning())
    }

    pub fn errors(&self) -> Vec<LogMessage> {
        self.select(|m| m.is_error())
    }

    /// Success and failure result records.
    pub fn results(&self) -> Vec<LogMessage> {
        self.select(|m| m.message_type.is_result())
    }

    /// Errors and warnings together.
    pub fn exceptions(&self) -> Vec<LogMessage> {
        self.select(|m| m.message_type.is_exception())
    }

    pub fn by_correlation(&self, correlation_id: &str) -> Vec<LogMessage> {
        self.select(|m| m.has_correlation(correlation_id))
    }

    /// Messages newer than `sequence`; lets a poller pick up where it left off.
    pub fn since(&self, sequence: Sequence) -> Vec<LogMessage> {
        self.select(|m| m.sequence > sequence)
    }

    fn select<F>(&self, predicate: F) -> Vec<LogMessage>
    where
        F: Fn(&LogMessage) -> bool,
    {
        self.buffer.iter().filter(|m| predicate(m)).cloned().collect()
    }

    /// Fold the buffered errors (optionally with warnings) into one
    /// exception chain, oldest innermost.
    pub fn exception(&self, include_warnings: bool) -> Option<LogException> {
        let messages = if include_warnings {
            self.exceptions()
        } else {
            self.errors()
        };
        build_exception(&messages)
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(&LogConfig::default())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_sequences_strictly_increase(size in -2i64..10, count in 0usize..60) {
            let mut log = MessageLog::new(&LogConfig { buffer_size: size, ..LogConfig::default() });
            let mut last = 0;
            for i in 0..count {
                let outcome = log.add(LogMessage::information(format!("m{}", i)));
                let seq = outcome.accepted[0].sequence;
                prop_assert!(seq > last);
                last = seq;
            }
            if size > 0 {
                prop_assert!(log.len() <= size as usize);
            } else {
                prop_assert_eq!(log.len(), count);
            }
            let buffered: Vec<u64> = log.messages().iter().map(|m| m.sequence).collect();
            prop_assert!(buffered.windows(2).all(|w| w[0] < w[1]));
            if let Some(latest) = log.latest() {
                prop_assert_eq!(latest.sequence, count as u64);
            }
        }
    }
}
