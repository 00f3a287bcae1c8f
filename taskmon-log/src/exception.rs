//! Folding logged messages into a single exception chain.

use taskmon_core::{LogException, LogMessage};

/// Fold messages into one nested exception.
///
/// The oldest message (lowest sequence) becomes the innermost cause and the
/// newest the outermost error, so walking `source()` replays the log
/// backwards. Returns `None` for an empty slice.
pub fn build_exception(messages: &[LogMessage]) -> Option<LogException> {
    let mut ordered: Vec<&LogMessage> = messages.iter().collect();
    ordered.sort_by_key(|m| m.sequence);

    ordered.into_iter().fold(None, |inner, message| {
        let link = LogException::from_message(message);
        Some(match inner {
            Some(inner) => link.with_inner(inner),
            None => link,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(sequence: u64, text: &str) -> LogMessage {
        LogMessage {
            sequence,
            ..LogMessage::error(text)
        }
    }

    #[test]
    fn test_empty_builds_nothing() {
        assert!(build_exception(&[]).is_none());
    }

    #[test]
    fn test_oldest_is_innermost() {
        let messages = vec![error(1, "connect failed"), error(2, "retry failed"), error(3, "gave up")];
        let chain = build_exception(&messages).unwrap();

        let texts: Vec<&str> = chain.chain().map(|e| e.message.as_str()).collect();
        assert_eq!(texts, vec!["gave up", "retry failed", "connect failed"]);
        assert_eq!(chain.root_cause().sequence, 1);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let messages = vec![error(7, "late"), error(2, "early")];
        let chain = build_exception(&messages).unwrap();
        assert_eq!(chain.message, "late");
        assert_eq!(chain.root_cause().message, "early");
    }
}
