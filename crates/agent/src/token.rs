//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token.
//! This approximation is accurate within ~10% for BPE tokenizers on
//! English text, and it is cheap enough to run on every step when
//! deciding whether the compressor needs to fire.

use turnstone_core::message::Message;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() + 3) / 4
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Each message costs ~4 tokens of overhead for role name, delimiters,
/// and formatting markers in the API wire format.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let overhead = 4;
    overhead + estimate_tokens(&message.content)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn message_overhead_applied() {
        let msg = Message::user("test");
        assert_eq!(estimate_message_tokens(&msg), 5);
    }

    #[test]
    fn slice_sums_messages() {
        let messages = vec![Message::user("test"), Message::assistant("test")];
        assert_eq!(estimate_messages_tokens(&messages), 10);
    }
}
