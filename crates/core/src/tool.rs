//! Tool trait and the Tool Invoker — uniform dispatch over heterogeneous
//! tool implementations.
//!
//! Tools give the agent the ability to act: stash data in the scratchpad,
//! search the web, send email, generate documents. The engine treats them
//! all through one `invoke(name, args) -> result` surface; whether a tool
//! is a built-in utility or a third-party connector is invisible here.

use crate::error::ToolError;
use crate::event::{DomainEvent, EventBus};
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Prefix tagging execution-level failures folded back into history.
///
/// Signals to the model that retrying with different arguments or pivoting
/// to an alternative tool is the right recovery, as opposed to a gateway
/// error where the call syntax itself was wrong.
pub const TOOL_ERROR_PREFIX: &str = "[TOOL ERROR]";

/// A validated, resolved request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,
}

/// The core Tool trait.
///
/// Each tool implements this trait and registers in the `ToolRegistry`.
/// `domain` groups related tools for intent routing.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "scratchpad_save").
    fn name(&self) -> &str;

    /// The routing domain this tool belongs to (e.g., "SESSION_SCRATCHPAD").
    fn domain(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with validated, resolved arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            domain: self.domain().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The Tool Invoker: a registry of available tools with uniform dispatch.
///
/// The reasoning loop uses this to:
/// 1. Get tool definitions to expose to the model (filtered by domain)
/// 2. Execute gateway-approved calls, with a per-call timeout
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    event_bus: Option<Arc<EventBus>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            event_bus: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Attach an event bus for best-effort "running X…" status events.
    /// These are side channel only and never enter the message history.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Set the per-call execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Tool definitions filtered to the given routing domains.
    pub fn definitions_for_domains(&self, domains: &[String]) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|t| domains.iter().any(|d| d == t.domain()))
            .map(|t| t.to_definition())
            .collect()
    }

    /// Execute a validated tool call, bounded by the per-call timeout.
    ///
    /// A timeout surfaces as `ToolError::Timeout`; like every other failure
    /// here it is folded back as a `[TOOL ERROR]` observation by the loop,
    /// never a loop-level failure.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolStarted {
                tool_name: call.name.clone(),
                call_id: call.id.clone(),
                timestamp: Utc::now(),
            });
        }

        let start = std::time::Instant::now();
        let outcome = tokio::time::timeout(self.timeout, tool.execute(call.arguments.clone()))
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            })
            .and_then(|r| r);

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: outcome.as_ref().map(|r| r.success).unwrap_or(false),
                duration_ms: start.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
        }

        outcome
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// The distinct routing domains covered by registered tools.
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .tools
            .values()
            .map(|t| t.domain().to_string())
            .collect();
        domains.sort();
        domains.dedup();
        domains
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn domain(&self) -> &str {
            "UTILITY_TOOLS"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult {
                call_id: "test".into(),
                success: true,
                output: text,
            })
        }
    }

    /// A tool that never finishes, for timeout tests.
    struct StallTool;

    #[async_trait]
    impl Tool for StallTool {
        fn name(&self) -> &str {
            "stall"
        }
        fn domain(&self) -> &str {
            "UTILITY_TOOLS"
        }
        fn description(&self) -> &str {
            "Hangs forever"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            std::future::pending().await
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn domain_filtering() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let defs = registry.definitions_for_domains(&["UTILITY_TOOLS".to_string()]);
        assert_eq!(defs.len(), 1);

        let none = registry.definitions_for_domains(&["WEB_TOOLS".to_string()]);
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "hello world"}),
        };
        let result = registry.execute(&call).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn execution_times_out() {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_millis(20));
        registry.register(Box::new(StallTool));

        let call = ToolCall {
            id: "call_1".into(),
            name: "stall".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn status_events_emitted() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();

        let mut registry = ToolRegistry::new().with_event_bus(bus);
        registry.register(Box::new(EchoTool));

        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "hi"}),
        };
        registry.execute(&call).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.as_ref(), DomainEvent::ToolStarted { .. }));
        let second = rx.recv().await.unwrap();
        match second.as_ref() {
            DomainEvent::ToolExecuted { success, .. } => assert!(success),
            other => panic!("Expected ToolExecuted, got {:?}", other),
        }
    }
}
