//! Execution Gateway — the only path from a model-issued tool call to a
//! dispatched tool invocation.
//!
//! Pipeline, strictly ordered:
//! 1. Validate every argument against the tool's declared schema
//!    (required fields, primitive types, length ceilings).
//! 2. Resolve `ref:<key>` pointers against the session scratchpad.
//! 3. Hand the fully resolved arguments to the Tool Invoker.
//!
//! All validation completes before any reference is resolved, so a call
//! with both a bad field and a dangling reference reports the schema
//! problem first and never touches the store.
//!
//! Gateway failures never escape the turn: each one formats into a
//! `[GATEWAY ERROR]` observation with a fixed actionable hint, folded
//! into history so the model can correct its call syntax next step.

pub mod schema;

pub use schema::{FieldKind, ParamType, ParameterSpec, SchemaCatalog, ToolSchema};

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use turnstone_core::{SessionId, ToolCall};
use turnstone_scratchpad::ScratchpadStore;

/// Prefix tagging call-syntax failures folded back into history.
pub const GATEWAY_ERROR_PREFIX: &str = "[GATEWAY ERROR]";

/// A rejected tool call. Each subtype carries a fixed hint telling the
/// model how to fix the call.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Tool '{0}' not found")]
    UnknownTool(String),

    #[error("Missing required field '{field}' for tool '{tool}'")]
    MissingField { tool: String, field: String },

    #[error("Field '{field}' must be a {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },

    #[error("Field '{field}' exceeds the {max_chars}-character limit ({actual_chars} chars)")]
    ValueTooLong {
        field: String,
        max_chars: usize,
        actual_chars: usize,
    },

    #[error("Reference 'ref:{key}' not found in this session's scratchpad")]
    UnresolvedReference { key: String },
}

impl GatewayError {
    /// The fixed recovery hint for this failure subtype.
    pub fn hint(&self) -> &'static str {
        match self {
            GatewayError::UnknownTool(_) => {
                "Verify the tool name is one of the currently offered tools."
            }
            GatewayError::MissingField { .. } => "This field is mandatory.",
            GatewayError::TypeMismatch { expected, .. } => match *expected {
                "string" => "Enclose the value in quotes.",
                "array" => "Use a list/array format.",
                _ => "Supply a value of the declared type.",
            },
            GatewayError::ValueTooLong { .. } => {
                "Shorten the value, or save it with scratchpad_save and pass the ref:key instead."
            }
            GatewayError::UnresolvedReference { .. } => {
                "Save the data to the scratchpad first, or verify the reference key with scratchpad_list."
            }
        }
    }

    /// Format as the tool-role observation the loop folds into history.
    pub fn observation(&self) -> String {
        format!("{GATEWAY_ERROR_PREFIX} {self}. [HINT]: {}", self.hint())
    }
}

/// Whole-string reference pointer grammar: `ref:` followed by a key of
/// ASCII alphanumerics, underscores, or hyphens. Substrings that merely
/// contain "ref:" (prose, URLs) are not pointers.
fn parse_ref(value: &str) -> Option<&str> {
    let key = value.strip_prefix("ref:")?;
    if !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Some(key)
    } else {
        None
    }
}

/// Safety middleware between model tool calls and actual execution.
pub struct ExecutionGateway {
    catalog: SchemaCatalog,
    scratchpad: Arc<dyn ScratchpadStore>,
}

impl ExecutionGateway {
    pub fn new(catalog: SchemaCatalog, scratchpad: Arc<dyn ScratchpadStore>) -> Self {
        Self {
            catalog,
            scratchpad,
        }
    }

    /// Validate and resolve one tool call.
    ///
    /// On success returns a `ToolCall` whose arguments have every
    /// reference pointer replaced by stored content; the caller's
    /// argument value is never mutated, so the model-visible call stays
    /// exactly as the model wrote it.
    pub async fn prepare(
        &self,
        session_id: &SessionId,
        call_id: &str,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<ToolCall, GatewayError> {
        let schema = self
            .catalog
            .get(tool_name)
            .ok_or_else(|| GatewayError::UnknownTool(tool_name.to_string()))?;

        self.validate(schema, arguments)?;
        let resolved = self.resolve_refs(session_id, arguments.clone()).await?;

        debug!(tool = tool_name, call_id, "Gateway approved tool call");
        Ok(ToolCall {
            id: call_id.to_string(),
            name: tool_name.to_string(),
            arguments: resolved,
        })
    }

    fn validate(&self, schema: &ToolSchema, arguments: &Value) -> Result<(), GatewayError> {
        for spec in &schema.parameters {
            let value = arguments.get(&spec.name);

            let Some(value) = value.filter(|v| !v.is_null()) else {
                if spec.required {
                    return Err(GatewayError::MissingField {
                        tool: schema.name.clone(),
                        field: spec.name.clone(),
                    });
                }
                continue;
            };

            if !spec.param_type.describes(value) {
                return Err(GatewayError::TypeMismatch {
                    field: spec.name.clone(),
                    expected: spec.param_type.label(),
                });
            }

            if let (Some(max_chars), Some(s)) = (spec.kind.max_chars(), value.as_str()) {
                let actual_chars = s.chars().count();
                if actual_chars > max_chars {
                    return Err(GatewayError::ValueTooLong {
                        field: spec.name.clone(),
                        max_chars,
                        actual_chars,
                    });
                }
            }
        }
        Ok(())
    }

    /// Replace every whole-string `ref:<key>` pointer in the argument
    /// tree, recursing through arrays and objects. `NotFound` on any
    /// pointer fails the whole call.
    async fn resolve_refs(
        &self,
        session_id: &SessionId,
        value: Value,
    ) -> Result<Value, GatewayError> {
        match value {
            Value::String(s) => {
                if let Some(key) = parse_ref(&s) {
                    let content = self
                        .scratchpad
                        .get(session_id, key)
                        .await
                        .map_err(|_| GatewayError::UnresolvedReference {
                            key: key.to_string(),
                        })?;
                    debug!(key, chars = content.len(), "Resolved scratchpad reference");
                    Ok(Value::String(content))
                } else {
                    Ok(Value::String(s))
                }
            }
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(Box::pin(self.resolve_refs(session_id, item)).await?);
                }
                Ok(Value::Array(resolved))
            }
            Value::Object(map) => {
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    resolved.insert(k, Box::pin(self.resolve_refs(session_id, v)).await?);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use turnstone_core::ToolDefinition;
    use turnstone_scratchpad::InMemoryScratchpad;

    fn definitions() -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "send_email".into(),
            domain: "COMMUNICATION_TOOLS".into(),
            description: "Send an email".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "subject": { "type": "string" },
                    "body": { "type": "string" },
                    "recipients": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["subject", "body"]
            }),
        }]
    }

    async fn gateway_with_entry(key: &str, content: &str) -> (ExecutionGateway, SessionId) {
        let scratchpad = Arc::new(InMemoryScratchpad::new());
        let session = SessionId::new();
        scratchpad
            .put(&session, Some(key), content, "", "test")
            .await
            .unwrap();
        let gateway = ExecutionGateway::new(SchemaCatalog::from_definitions(&definitions()), scratchpad);
        (gateway, session)
    }

    #[tokio::test]
    async fn valid_call_passes_through() {
        let (gateway, session) = gateway_with_entry("unused", "x").await;
        let call = gateway
            .prepare(
                &session,
                "call_1",
                "send_email",
                &json!({"subject": "Hello", "body": "World"}),
            )
            .await
            .unwrap();
        assert_eq!(call.arguments["subject"], "Hello");
    }

    #[tokio::test]
    async fn unknown_tool_rejected() {
        let (gateway, session) = gateway_with_entry("unused", "x").await;
        let err = gateway
            .prepare(&session, "call_1", "teleport", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownTool(_)));
        assert!(err.observation().starts_with(GATEWAY_ERROR_PREFIX));
        assert!(err.observation().contains("[HINT]"));
    }

    #[tokio::test]
    async fn missing_required_field_rejected() {
        let (gateway, session) = gateway_with_entry("unused", "x").await;
        let err = gateway
            .prepare(&session, "call_1", "send_email", &json!({"subject": "Hi"}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MissingField { ref field, .. } if field == "body"));
    }

    #[tokio::test]
    async fn type_mismatch_rejected_with_array_hint() {
        let (gateway, session) = gateway_with_entry("unused", "x").await;
        let err = gateway
            .prepare(
                &session,
                "call_1",
                "send_email",
                &json!({"subject": "Hi", "body": "B", "recipients": "a@example.com"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TypeMismatch { .. }));
        assert!(err.hint().contains("array"));
    }

    #[tokio::test]
    async fn oversized_title_field_fails_not_truncates() {
        let (gateway, session) = gateway_with_entry("unused", "x").await;
        let err = gateway
            .prepare(
                &session,
                "call_1",
                "send_email",
                &json!({"subject": "S".repeat(501), "body": "B"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ValueTooLong { max_chars: 500, .. }
        ));
    }

    #[tokio::test]
    async fn reference_resolved_to_stored_content() {
        let (gateway, session) = gateway_with_entry("draft_1", "the full draft text").await;
        let args = json!({"subject": "Hi", "body": "ref:draft_1"});
        let call = gateway
            .prepare(&session, "call_1", "send_email", &args)
            .await
            .unwrap();
        assert_eq!(call.arguments["body"], "the full draft text");
        // Caller's copy untouched
        assert_eq!(args["body"], "ref:draft_1");
    }

    #[tokio::test]
    async fn reference_resolved_inside_arrays() {
        let (gateway, session) = gateway_with_entry("addr_1", "a@example.com").await;
        let call = gateway
            .prepare(
                &session,
                "call_1",
                "send_email",
                &json!({"subject": "Hi", "body": "B", "recipients": ["ref:addr_1", "b@example.com"]}),
            )
            .await
            .unwrap();
        assert_eq!(call.arguments["recipients"][0], "a@example.com");
        assert_eq!(call.arguments["recipients"][1], "b@example.com");
    }

    #[tokio::test]
    async fn dangling_reference_fails_whole_call() {
        let (gateway, session) = gateway_with_entry("other", "x").await;
        let err = gateway
            .prepare(
                &session,
                "call_1",
                "send_email",
                &json!({"subject": "Hi", "body": "ref:missing_key"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnresolvedReference { ref key } if key == "missing_key"));
    }

    #[tokio::test]
    async fn validation_precedes_resolution() {
        // Missing required field AND dangling ref: the schema error wins.
        let (gateway, session) = gateway_with_entry("other", "x").await;
        let err = gateway
            .prepare(
                &session,
                "call_1",
                "send_email",
                &json!({"subject": "ref:missing_key"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MissingField { .. }));
    }

    #[test]
    fn ref_grammar_is_whole_string() {
        assert_eq!(parse_ref("ref:report_1"), Some("report_1"));
        assert_eq!(parse_ref("ref:a-b_C9"), Some("a-b_C9"));
        assert_eq!(parse_ref("see ref:report_1 above"), None);
        assert_eq!(parse_ref("ref:"), None);
        assert_eq!(parse_ref("ref:bad key"), None);
        assert_eq!(parse_ref("prefix"), None);
    }
}
