//! Durability policy — decides which turns are worth remembering.
//!
//! The loop treats this as an opaque predicate: when a finished turn is
//! judged durable, it is offered to long-term memory and snapshotted to
//! the scratchpad. What counts as durable is a policy choice, so it
//! lives behind a trait.

/// Predicate over a turn's user input.
pub trait DurabilityPolicy: Send + Sync {
    fn is_durable(&self, user_input: &str) -> bool;
}

/// Default policy: persist only messages that look like durable
/// preference, profile, or project-state statements.
pub struct KeywordDurabilityPolicy;

const DURABLE_MARKERS: &[&str] = &[
    "i am ",
    "my name is",
    "i live in",
    "i work as",
    "i prefer",
    "i like",
    "i dislike",
    "always",
    "never",
    "my goal is",
    "i'm working on",
    "we are building",
    "remember",
    "save this",
    "for future",
    "important",
    "note this",
];

impl DurabilityPolicy for KeywordDurabilityPolicy {
    fn is_durable(&self, user_input: &str) -> bool {
        let text = user_input.trim().to_lowercase();
        if text.is_empty() {
            return false;
        }
        DURABLE_MARKERS.iter().any(|m| text.contains(m))
    }
}

/// A policy that never persists anything.
pub struct NeverDurable;

impl DurabilityPolicy for NeverDurable {
    fn is_durable(&self, _user_input: &str) -> bool {
        false
    }
}
