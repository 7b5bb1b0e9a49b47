//! Scratchpad tool family.
//!
//! Gives the model explicit control over the session blob store:
//! save content and get back a `ref:key`, retrieve by key, list what is
//! stored, and search stored content by keyword.

use crate::SCRATCHPAD_DOMAIN;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;
use turnstone_core::{SessionId, Tool, ToolError, ToolResult};
use turnstone_scratchpad::{ScratchpadStore, normalize_key};

/// Register the whole scratchpad family into a registry.
pub fn register_scratchpad_tools(
    registry: &mut turnstone_core::ToolRegistry,
    scratchpad: Arc<dyn ScratchpadStore>,
    session_id: SessionId,
) {
    registry.register(Box::new(ScratchpadSaveTool {
        scratchpad: scratchpad.clone(),
        session_id: session_id.clone(),
    }));
    registry.register(Box::new(ScratchpadGetTool {
        scratchpad: scratchpad.clone(),
        session_id: session_id.clone(),
    }));
    registry.register(Box::new(ScratchpadListTool {
        scratchpad: scratchpad.clone(),
        session_id: session_id.clone(),
    }));
    registry.register(Box::new(ScratchpadSearchTool {
        scratchpad,
        session_id,
    }));
}

fn str_arg<'a>(arguments: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing string field '{name}'")))
}

fn ok(output: String) -> ToolResult {
    ToolResult {
        // The registry correlates by the ToolCall id; tools don't know it.
        call_id: String::new(),
        success: true,
        output,
    }
}

// ── scratchpad_save ─────────────────────────────────────────────────────

pub struct ScratchpadSaveTool {
    scratchpad: Arc<dyn ScratchpadStore>,
    session_id: SessionId,
}

#[async_trait]
impl Tool for ScratchpadSaveTool {
    fn name(&self) -> &str {
        "scratchpad_save"
    }

    fn domain(&self) -> &str {
        SCRATCHPAD_DOMAIN
    }

    fn description(&self) -> &str {
        "Save large data to the session scratchpad. Returns a ref:key pointer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "Unique key for this data (alphanumeric, underscore, hyphen)"
                },
                "content": { "type": "string", "description": "The content to store" },
                "description": {
                    "type": "string",
                    "description": "Brief description of what is stored"
                }
            },
            "required": ["key", "content"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let key = str_arg(&arguments, "key")?;
        let content = str_arg(&arguments, "content")?;
        let description = arguments
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("");

        debug!(key, chars = content.len(), "Saving to scratchpad");
        let stored = self
            .scratchpad
            .put(
                &self.session_id,
                Some(normalize_key(key)),
                content,
                description,
                SCRATCHPAD_DOMAIN,
            )
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "scratchpad_save".into(),
                reason: e.to_string(),
            })?;

        Ok(ok(format!(
            "Saved to scratchpad. Reference: ref:{stored} ({} chars)",
            content.chars().count()
        )))
    }
}

// ── scratchpad_get ──────────────────────────────────────────────────────

pub struct ScratchpadGetTool {
    scratchpad: Arc<dyn ScratchpadStore>,
    session_id: SessionId,
}

#[async_trait]
impl Tool for ScratchpadGetTool {
    fn name(&self) -> &str {
        "scratchpad_get"
    }

    fn domain(&self) -> &str {
        SCRATCHPAD_DOMAIN
    }

    fn description(&self) -> &str {
        "Retrieve the full content stored under a scratchpad key."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "The scratchpad key (with or without the 'ref:' prefix)"
                }
            },
            "required": ["key"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let key = normalize_key(str_arg(&arguments, "key")?);
        match self.scratchpad.get(&self.session_id, key).await {
            Ok(content) => Ok(ok(content)),
            Err(_) => Ok(ToolResult {
                call_id: String::new(),
                success: false,
                output: format!(
                    "Key '{key}' not found in scratchpad. [HINT]: Use scratchpad_list to see available keys."
                ),
            }),
        }
    }
}

// ── scratchpad_list ─────────────────────────────────────────────────────

pub struct ScratchpadListTool {
    scratchpad: Arc<dyn ScratchpadStore>,
    session_id: SessionId,
}

#[async_trait]
impl Tool for ScratchpadListTool {
    fn name(&self) -> &str {
        "scratchpad_list"
    }

    fn domain(&self) -> &str {
        SCRATCHPAD_DOMAIN
    }

    fn description(&self) -> &str {
        "List all items currently stored in the scratchpad."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
        let items = self
            .scratchpad
            .list(&self.session_id)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "scratchpad_list".into(),
                reason: e.to_string(),
            })?;

        if items.is_empty() {
            return Ok(ok("Scratchpad is empty.".into()));
        }

        let mut lines = vec!["Scratchpad contents:".to_string()];
        for item in items {
            let desc = if item.description.is_empty() {
                "No description"
            } else {
                &item.description
            };
            lines.push(format!(
                "• ref:{} — {} ({} chars)",
                item.key, desc, item.size_chars
            ));
        }
        Ok(ok(lines.join("\n")))
    }
}

// ── scratchpad_search ───────────────────────────────────────────────────

pub struct ScratchpadSearchTool {
    scratchpad: Arc<dyn ScratchpadStore>,
    session_id: SessionId,
}

#[async_trait]
impl Tool for ScratchpadSearchTool {
    fn name(&self) -> &str {
        "scratchpad_search"
    }

    fn domain(&self) -> &str {
        SCRATCHPAD_DOMAIN
    }

    fn description(&self) -> &str {
        "Search scratchpad content by keyword. Returns matching keys."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Keyword to search for" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let query = str_arg(&arguments, "query")?;
        let keys = self
            .scratchpad
            .search(&self.session_id, query)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "scratchpad_search".into(),
                reason: e.to_string(),
            })?;

        if keys.is_empty() {
            return Ok(ok(format!("No scratchpad entries match '{query}'.")));
        }
        let listed = keys
            .iter()
            .map(|k| format!("ref:{k}"))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ok(format!("Matching entries:\n{listed}")))
    }
}
