//! Token estimation.
//!
//! Uses a character heuristic of ~4 characters per token, rounded up.
//! Good enough for a progress counter and telemetry; never used to cut
//! context.

use quill_core::message::Conversation;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimate for everything that will be sent as model input.
pub fn estimate_input_tokens(conversation: &Conversation) -> usize {
    conversation.estimated_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::message::Message;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn input_includes_per_message_overhead() {
        let mut conv = Conversation::new();
        conv.push(Message::user("test")); // 1 token + 4 overhead
        conv.push(Message::assistant("hello")); // 2 tokens + 4 overhead
        assert_eq!(estimate_input_tokens(&conv), 11);
    }
}
