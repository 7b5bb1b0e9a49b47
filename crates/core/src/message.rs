//! Message and Turn domain types.
//!
//! These are the core value objects that flow through the engine:
//! a user message opens a Turn → the router picks tool domains → the
//! reasoning loop exchanges model/tool messages → the Turn completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a session.
///
/// All scratchpad entries, traces, and turns are scoped to a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions (identity, notices, reflection notes)
    System,
    /// Tool execution result
    Tool,
}

/// Metadata key marking a message as a compression product.
pub const META_SUMMARY: &str = "summary";
/// Metadata key marking a message as a sandwich-preview replacement.
pub const META_ARCHIVED: &str = "archived";

/// A single message in a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (compression tags, provider info, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn base(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::base(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::base(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::base(Role::System, content)
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::base(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Mark this message with a boolean metadata flag.
    pub fn tag(mut self, key: &str) -> Self {
        self.metadata
            .insert(key.to_string(), serde_json::Value::Bool(true));
        self
    }

    fn has_tag(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Whether this message is a prior compression summary.
    pub fn is_summary(&self) -> bool {
        self.has_tag(META_SUMMARY)
    }

    /// Whether this message is an archived-output sandwich preview.
    pub fn is_archived(&self) -> bool {
        self.has_tag(META_ARCHIVED)
    }
}

/// A tool call embedded in an assistant message, as emitted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

/// Terminal (or in-flight) status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The loop is still stepping.
    Running,
    /// The model produced a final answer within budget.
    Completed,
    /// The step/tool budget ran out; the self-assessment protocol fired.
    BudgetExhausted,
    /// Transport exhaustion or a protocol invariant violation.
    Failed,
    /// Cancelled between steps by the caller.
    Cancelled,
}

/// One user request plus the ordered exchanges produced while answering it.
///
/// Owned exclusively by the reasoning loop for the turn's lifetime;
/// persisted or discarded by an external collaborator afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// The session this turn belongs to
    pub session_id: SessionId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// Reasoning steps taken so far
    pub steps: usize,

    /// Cumulative tool calls dispatched
    pub total_tool_calls: usize,

    /// Terminal status
    pub status: TurnStatus,

    /// When this turn was opened
    pub started_at: DateTime<Utc>,
}

impl Turn {
    /// Open a new turn in the given session.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
            steps: 0,
            total_tool_calls: 0,
            status: TurnStatus::Running,
            started_at: Utc::now(),
        }
    }

    /// Append a message to the turn.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The ids of tool calls issued by the most recent assistant message.
    pub fn pending_tool_call_ids(&self) -> Vec<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.tool_calls.iter().map(|tc| tc.id.as_str()).collect())
            .unwrap_or_default()
    }

    /// Protocol check: a tool-role message must answer a tool call emitted
    /// by the immediately preceding assistant message.
    pub fn is_valid_tool_result(&self, tool_call_id: &str) -> bool {
        self.pending_tool_call_ids().contains(&tool_call_id)
    }
}
