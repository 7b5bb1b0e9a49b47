//! Context Compressor — keeps the live history inside the token budget
//! without discarding retrievable information.
//!
//! Two reduction strategies, selected by the shape of the overage:
//!
//! - **Atomic**: one message hogs most of the budget (a huge tool result
//!   pasted into history). Its full content is archived to the
//!   scratchpad and replaced in-place by a sandwich preview plus the
//!   reference key.
//! - **Map-reduce**: the compressible slice is chunked at semantic
//!   boundaries, each chunk summarized at near-zero temperature, and the
//!   summaries merged into one tagged `[CONVERSATION SUMMARY]` message
//!   that physically replaces the slice. The unmodified source is
//!   archived first, and the summary carries its reference key.
//!
//! Protected always: the system identity message, the two most recent
//! user messages, prior summary messages (verbatim, never re-summarized),
//! and any tool-call/result pair the model has not observed yet.

use crate::token::{estimate_message_tokens, estimate_messages_tokens};
use std::sync::Arc;
use tracing::{debug, info, warn};
use turnstone_core::{META_ARCHIVED, META_SUMMARY, Message, Provider, ProviderRequest, Role, SessionId};
use turnstone_scratchpad::{ScratchpadStore, sandwich_preview};

const COMPRESS_PROMPT: &str = "\
You are a lossless context compressor for an AI conversation.
Summarize the conversation below into a dense, information-rich block.
Preserve all facts, decisions, tool results, numbers, and user preferences.
Remove greetings, filler, and repeated information.

Conversation:
{history}

Return a structured summary starting with: [CONVERSATION SUMMARY]";

/// Share of the budget a single message must occupy to qualify for
/// atomic compression.
const ATOMIC_SHARE: f64 = 0.75;

pub struct ContextCompressor {
    provider: Arc<dyn Provider>,
    scratchpad: Arc<dyn ScratchpadStore>,
    model: String,
    temperature: f32,
    context_limit_tokens: usize,
    chunk_size_chars: usize,
}

impl ContextCompressor {
    pub fn new(
        provider: Arc<dyn Provider>,
        scratchpad: Arc<dyn ScratchpadStore>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            scratchpad,
            model: model.into(),
            temperature: 0.1,
            context_limit_tokens: 6000,
            chunk_size_chars: 12_000,
        }
    }

    pub fn with_context_limit(mut self, tokens: usize) -> Self {
        self.context_limit_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Bring the history back under budget if it has drifted over.
    ///
    /// Infallible by design: a failed summarization call degrades to a
    /// truncated excerpt rather than aborting the turn.
    pub async fn optimize(&self, session_id: &SessionId, messages: Vec<Message>) -> Vec<Message> {
        let estimated = estimate_messages_tokens(&messages);
        if estimated <= self.context_limit_tokens {
            return messages;
        }
        info!(
            estimated,
            limit = self.context_limit_tokens,
            "Context over budget, compressing"
        );

        let messages = self.atomic_pass(session_id, messages).await;
        if estimate_messages_tokens(&messages) <= self.context_limit_tokens {
            return messages;
        }

        self.map_reduce(session_id, messages).await
    }

    /// Replace any single dominating message with an archived preview.
    async fn atomic_pass(&self, session_id: &SessionId, mut messages: Vec<Message>) -> Vec<Message> {
        let threshold = (self.context_limit_tokens as f64 * ATOMIC_SHARE) as usize;
        for (idx, message) in messages.iter_mut().enumerate() {
            // The identity message and user messages stay verbatim;
            // oversized user input is handled by the gatekeeper upstream.
            if idx == 0 || message.role == Role::User {
                continue;
            }
            if message.is_summary() || message.is_archived() {
                continue;
            }
            if estimate_message_tokens(message) <= threshold {
                continue;
            }

            match self
                .scratchpad
                .put(session_id, None, &message.content, "Archived oversized message", "archived")
                .await
            {
                Ok(key) => {
                    debug!(key, index = idx, "Atomic compression archived message");
                    let preview = sandwich_preview(&message.content);
                    message.content =
                        format!("{preview}\n\n[Full content archived as ref:{key}]");
                    message
                        .metadata
                        .insert(META_ARCHIVED.to_string(), serde_json::Value::Bool(true));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to archive oversized message, leaving in place");
                }
            }
        }
        messages
    }

    /// Index of the first protected message: the second-to-last user
    /// message, pulled earlier if that would orphan a tool-result from
    /// its issuing assistant message.
    fn protect_from(messages: &[Message]) -> usize {
        let user_indices: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::User)
            .map(|(i, _)| i)
            .collect();
        let mut boundary = match user_indices.len() {
            0 => messages.len(),
            1 => user_indices[0],
            n => user_indices[n - 2],
        };
        // Keep tool results with the assistant message that issued them.
        while boundary > 1 && boundary < messages.len() && messages[boundary].role == Role::Tool {
            boundary -= 1;
        }
        boundary
    }

    async fn map_reduce(&self, session_id: &SessionId, messages: Vec<Message>) -> Vec<Message> {
        let boundary = Self::protect_from(&messages);
        if boundary <= 1 {
            return messages;
        }

        let system_msg = messages[0].clone();
        let compressible = &messages[1..boundary];
        let protected = messages[boundary..].to_vec();

        // Prior summaries survive verbatim; everything else is source.
        let kept_summaries: Vec<Message> = compressible
            .iter()
            .filter(|m| m.is_summary())
            .cloned()
            .collect();
        let history_text = compressible
            .iter()
            .filter(|m| !m.is_summary() && !m.content.is_empty())
            .map(|m| {
                let role = match m.role {
                    Role::User => "USER",
                    Role::Assistant => "ASSISTANT",
                    Role::System => "SYSTEM",
                    Role::Tool => "TOOL",
                };
                format!("{role}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        if history_text.trim().is_empty() {
            return messages;
        }

        // Archive the unmodified source before any lossy step.
        let source_ref = match self
            .scratchpad
            .put(session_id, None, &history_text, "Compressed conversation source", "conversation")
            .await
        {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Failed to archive compression source");
                None
            }
        };

        // Map: summarize each chunk independently.
        let chunks = smart_chunk(&history_text, self.chunk_size_chars);
        let mut summaries = Vec::with_capacity(chunks.len());
        for (idx, chunk) in chunks.iter().enumerate() {
            let prompt = COMPRESS_PROMPT.replace("{history}", chunk);
            let mut request =
                ProviderRequest::text(&self.model, vec![Message::user(prompt)], self.temperature);
            request.max_tokens = Some(600);

            match self.provider.complete(request).await {
                Ok(response) => summaries.push(response.message.content),
                Err(e) => {
                    warn!(chunk = idx + 1, error = %e, "Chunk summarization failed, truncating");
                    let truncated: String = chunk.chars().take(500).collect();
                    summaries.push(format!("{truncated}... [truncated]"));
                }
            }
        }

        // Reduce: merge chunk summaries into one tagged message.
        let combined = summaries.join("\n\n");
        let header = match &source_ref {
            Some(key) => format!("[CONVERSATION SUMMARY]\nSource archived at ref:{key}\n"),
            None => "[CONVERSATION SUMMARY]\n".to_string(),
        };
        let summary_message = Message::system(format!("{header}{combined}")).tag(META_SUMMARY);

        let mut result = Vec::with_capacity(2 + kept_summaries.len() + protected.len());
        result.push(system_msg);
        result.extend(kept_summaries);
        result.push(summary_message);
        result.extend(protected);

        debug!(
            before = messages.len(),
            after = result.len(),
            tokens_after = estimate_messages_tokens(&result),
            "Map-reduce compression complete"
        );
        result
    }
}

/// Split text into chunks at semantic boundaries: prefers paragraph
/// breaks, then line breaks, then sentence ends, then word boundaries.
/// Never splits mid-word.
fn smart_chunk(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > chunk_size {
        // Byte-safe window end at a char boundary.
        let mut window_end = chunk_size;
        while !rest.is_char_boundary(window_end) {
            window_end -= 1;
        }
        let window = &rest[..window_end];

        let mut split_at = window_end;
        for sep in ["\n\n", "\n", ". ", " "] {
            if let Some(idx) = window.rfind(sep) {
                if idx > chunk_size / 2 {
                    split_at = idx + sep.len();
                    break;
                }
            }
        }
        chunks.push(rest[..split_at].to_string());
        rest = &rest[split_at..];
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use turnstone_core::{ProviderError, ProviderResponse};
    use turnstone_scratchpad::{InMemoryScratchpad, OFFLOAD_MARKER};

    /// Provider that answers every call with a fixed summary.
    struct SummaryProvider;

    #[async_trait]
    impl Provider for SummaryProvider {
        fn name(&self) -> &str {
            "summary"
        }
        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(
                    "[CONVERSATION SUMMARY] User researched Paris hotels; budget 200 EUR/night.",
                ),
                usage: None,
                model: "summary".into(),
            })
        }
    }

    fn compressor(limit: usize) -> (ContextCompressor, Arc<InMemoryScratchpad>) {
        let scratchpad = Arc::new(InMemoryScratchpad::new());
        let c = ContextCompressor::new(Arc::new(SummaryProvider), scratchpad.clone(), "test-model")
            .with_context_limit(limit);
        (c, scratchpad)
    }

    #[tokio::test]
    async fn under_budget_history_is_untouched() {
        let (compressor, _) = compressor(6000);
        let session = SessionId::new();

        let mut messages = vec![Message::system("identity")];
        for i in 0..50 {
            messages.push(Message::user(format!("short message {i}")));
            messages.push(Message::assistant("short reply"));
        }
        let before = messages.len();

        let after = compressor.optimize(&session, messages).await;
        assert_eq!(after.len(), before);
        assert!(after.iter().all(|m| !m.is_summary() && !m.is_archived()));
    }

    #[tokio::test]
    async fn oversized_tool_result_is_atomically_archived() {
        let (compressor, scratchpad) = compressor(1000);
        let session = SessionId::new();
        let huge = "data line with numbers 42 and 99\n".repeat(500);

        let messages = vec![
            Message::system("identity"),
            Message::user("fetch the dataset"),
            Message::tool_result("call_1", huge.clone()),
            Message::user("now analyze it"),
        ];

        let after = compressor.optimize(&session, messages).await;

        let archived = after.iter().find(|m| m.is_archived()).unwrap();
        assert!(archived.content.contains(OFFLOAD_MARKER));
        assert!(archived.content.contains("[Full content archived as ref:"));

        // Round-trip fidelity: the stored blob is the exact original.
        let key = archived
            .content
            .rsplit("ref:")
            .next()
            .unwrap()
            .trim_end_matches(']')
            .to_string();
        let stored = scratchpad.get(&session, &key).await.unwrap();
        assert_eq!(stored, huge);
    }

    #[tokio::test]
    async fn map_reduce_protects_identity_and_recent_users() {
        let (compressor, _) = compressor(300);
        let session = SessionId::new();

        let mut messages = vec![Message::system("identity prompt")];
        for i in 0..20 {
            messages.push(Message::user(format!("question number {i} with some padding text")));
            messages.push(Message::assistant(format!("answer number {i} with some padding text")));
        }

        let after = compressor.optimize(&session, messages).await;

        assert_eq!(after[0].content, "identity prompt");
        let users: Vec<&Message> = after.iter().filter(|m| m.role == Role::User).collect();
        assert_eq!(users.len(), 2);
        assert!(users[0].content.contains("question number 18"));
        assert!(users[1].content.contains("question number 19"));
        assert!(after.iter().any(|m| m.is_summary()));
        assert!(after.len() < 42);
    }

    #[tokio::test]
    async fn summary_carries_source_reference_and_tag() {
        let (compressor, scratchpad) = compressor(300);
        let session = SessionId::new();

        let mut messages = vec![Message::system("identity")];
        for i in 0..20 {
            messages.push(Message::user(format!("user turn {i} padded with extra words here")));
            messages.push(Message::assistant(format!("assistant turn {i} padded with extra words")));
        }

        let after = compressor.optimize(&session, messages).await;
        let summary = after.iter().find(|m| m.is_summary()).unwrap();
        assert!(summary.content.starts_with("[CONVERSATION SUMMARY]"));
        assert!(summary.content.contains("Source archived at ref:"));

        // The archived source exists and contains the early turns.
        let keys = scratchpad.search(&session, "user turn 0").await.unwrap();
        assert!(!keys.is_empty());
    }

    #[tokio::test]
    async fn prior_summaries_are_not_resummarized() {
        let (compressor, _) = compressor(300);
        let session = SessionId::new();

        let prior = Message::system("[CONVERSATION SUMMARY]\nearlier era facts").tag(META_SUMMARY);
        let mut messages = vec![Message::system("identity"), prior];
        for i in 0..20 {
            messages.push(Message::user(format!("newer question {i} with filler filler filler")));
            messages.push(Message::assistant(format!("newer answer {i} with filler filler filler")));
        }

        let after = compressor.optimize(&session, messages).await;
        let summaries: Vec<&Message> = after.iter().filter(|m| m.is_summary()).collect();
        // The old summary survives verbatim next to the new one.
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].content.contains("earlier era facts"));
    }

    #[test]
    fn chunking_prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(700), "b".repeat(700));
        let chunks = smart_chunk(&text, 1000);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].trim_end().chars().all(|c| c == 'a'));
        assert!(chunks[1].chars().all(|c| c == 'b'));
    }

    #[test]
    fn chunking_never_splits_words_on_space_fallback() {
        let text = "word ".repeat(500);
        for chunk in smart_chunk(&text, 1000) {
            assert!(chunk.ends_with(' ') || chunk.ends_with("word"));
        }
    }

    #[test]
    fn protect_boundary_keeps_tool_pairs_together() {
        let mut assistant = Message::assistant("");
        assistant.tool_calls = vec![turnstone_core::MessageToolCall {
            id: "call_1".into(),
            name: "x".into(),
            arguments: "{}".into(),
        }];
        let messages = vec![
            Message::system("identity"),
            Message::user("first"),
            assistant,
            Message::tool_result("call_1", "result"),
            Message::user("second"),
        ];
        // Second-to-last user is index 1; boundary must not orphan the
        // tool result at index 3 from its assistant at index 2.
        let boundary = ContextCompressor::protect_from(&messages);
        assert_eq!(boundary, 1);
    }
}
