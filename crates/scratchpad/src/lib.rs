//! Session-scoped pass-by-reference blob store.
//!
//! Large payloads (oversized inputs, huge tool outputs, archived history)
//! are stored here and travel through the conversation as lightweight
//! `ref:<key>` pointers. The Execution Gateway resolves those pointers
//! back to full content just before a tool runs.
//!
//! All operations are scoped to a session id: a key saved in one session
//! is `NotFound` in every other session. Writing an existing key
//! overwrites it (last-write-wins, no versioning).

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileScratchpad;
pub use in_memory::InMemoryScratchpad;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turnstone_core::{ScratchpadError, SessionId};

/// Marker inserted between the head and tail slices of a sandwich preview.
pub const OFFLOAD_MARKER: &str = "... ✂️ [Content Offloaded to Scratchpad] ...";

/// A stored blob plus its index metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    pub key: String,
    pub description: String,
    pub content: String,
    pub size_chars: usize,
    pub created_at: DateTime<Utc>,
}

impl ScratchpadEntry {
    pub fn new(key: impl Into<String>, description: impl Into<String>, content: String) -> Self {
        let size_chars = content.chars().count();
        Self {
            key: key.into(),
            description: description.into(),
            content,
            size_chars,
            created_at: Utc::now(),
        }
    }
}

/// Lightweight index row returned by `list` — no content payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySummary {
    pub key: String,
    pub description: String,
    pub size_chars: usize,
    pub preview: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ScratchpadEntry> for EntrySummary {
    fn from(entry: &ScratchpadEntry) -> Self {
        Self {
            key: entry.key.clone(),
            description: entry.description.clone(),
            size_chars: entry.size_chars,
            preview: entry.content.chars().take(200).collect(),
            created_at: entry.created_at,
        }
    }
}

/// The scratchpad storage seam.
///
/// `put` with `key: None` generates a key from the domain hint plus a
/// per-session monotonic counter, so concurrent offloads never collide.
#[async_trait]
pub trait ScratchpadStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Store content under a key (generated from `domain` when absent).
    /// Returns the key the content now lives under.
    async fn put(
        &self,
        session_id: &SessionId,
        key: Option<&str>,
        content: &str,
        description: &str,
        domain: &str,
    ) -> Result<String, ScratchpadError>;

    /// Retrieve full content by key. `NotFound` when the key does not
    /// exist in this session, even if another session holds it.
    async fn get(&self, session_id: &SessionId, key: &str) -> Result<String, ScratchpadError>;

    /// Index of everything stored in this session.
    async fn list(&self, session_id: &SessionId) -> Result<Vec<EntrySummary>, ScratchpadError>;

    /// Best-effort substring search over content and descriptions.
    /// Returns matching keys.
    async fn search(&self, session_id: &SessionId, query: &str)
    -> Result<Vec<String>, ScratchpadError>;

    /// Remove all data for a session.
    async fn purge(&self, session_id: &SessionId) -> Result<(), ScratchpadError>;
}

/// Strip a leading `ref:` prefix so tools can pass either form.
pub fn normalize_key(key: &str) -> &str {
    key.strip_prefix("ref:").unwrap_or(key)
}

/// Head + marker + tail preview standing in for archived content.
///
/// Keeps the first and last 20% (by chars) so the model still sees how the
/// payload opens and closes, with the offload marker in between.
pub fn sandwich_preview(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let n = chars.len();
    let head_end = n / 5;
    let tail_start = n - n / 5;
    let head: String = chars[..head_end].iter().collect();
    let tail: String = chars[tail_start..].iter().collect();
    format!("{head}\n\n{OFFLOAD_MARKER}\n\n{tail}")
}

/// Deterministic generated key: `{domain}_{counter}`.
///
/// The domain hint is lowercased and squeezed to `[a-z0-9_]` so generated
/// keys always satisfy the reference grammar.
pub(crate) fn generated_key(domain: &str, counter: u64) -> String {
    let slug: String = domain
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        format!("entry_{counter}")
    } else {
        format!("{slug}_{counter}")
    }
}
