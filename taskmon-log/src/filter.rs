//! Arrival filter for log messages.

use taskmon_core::{LogConfig, LogMessage, MessageLevel, MessageType};

/// Decides which messages the log accepts.
///
/// Rejected messages are dropped before they get a sequence number; they are
/// never buffered or counted.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageFilter {
    minimum_level: MessageLevel,
    allowed_types: Option<Vec<MessageType>>,
}

impl MessageFilter {
    /// A filter that accepts everything.
    pub fn accept_all() -> Self {
        Self {
            minimum_level: MessageLevel::Low,
            allowed_types: None,
        }
    }

    pub fn from_config(config: &LogConfig) -> Self {
        Self {
            minimum_level: config.minimum_level,
            allowed_types: config.allowed_types.clone(),
        }
    }

    pub fn with_minimum_level(mut self, level: MessageLevel) -> Self {
        self.minimum_level = level;
        self
    }

    pub fn with_allowed_types(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.allowed_types = Some(types.into_iter().collect());
        self
    }

    pub fn minimum_level(&self) -> MessageLevel {
        self.minimum_level
    }

    pub fn allowed_types(&self) -> Option<&[MessageType]> {
        self.allowed_types.as_deref()
    }

    pub fn accepts(&self, message: &LogMessage) -> bool {
        if message.level < self.minimum_level {
            return false;
        }
        match &self.allowed_types {
            Some(types) => types.contains(&message.message_type),
            None => true,
        }
    }
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_accepts_everything() {
        let filter = MessageFilter::default();
        assert!(filter.accepts(&LogMessage::information("x").with_level(MessageLevel::Low)));
        assert!(filter.accepts(&LogMessage::new(
            MessageType::ActivityProgress,
            MessageLevel::Low,
            "tick"
        )));
    }

    #[test]
    fn test_level_and_type_filters_combine() {
        let filter = MessageFilter::accept_all()
            .with_minimum_level(MessageLevel::High)
            .with_allowed_types([MessageType::Error, MessageType::Warning]);

        assert!(filter.accepts(&LogMessage::error("bad")));
        assert!(filter.accepts(&LogMessage::warning("meh")));
        assert!(!filter.accepts(&LogMessage::warning("meh").with_level(MessageLevel::Normal)));
        assert!(!filter.accepts(&LogMessage::information("fine").with_level(MessageLevel::Critical)));
    }

    #[test]
    fn test_from_config() {
        let config = LogConfig {
            minimum_level: MessageLevel::Critical,
            allowed_types: Some(vec![MessageType::ActivityStart]),
            ..LogConfig::default()
        };
        let filter = MessageFilter::from_config(&config);
        assert_eq!(filter.minimum_level(), MessageLevel::Critical);
        assert_eq!(filter.allowed_types(), Some(&[MessageType::ActivityStart][..]));
    }
}
