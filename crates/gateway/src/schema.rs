//! Tool schema catalog.
//!
//! Parses the JSON-Schema parameter blocks that tools already declare for
//! the LLM into a typed form the gateway can validate against, so the
//! schema is authored exactly once per tool.

use serde_json::Value;
use std::collections::HashMap;
use turnstone_core::ToolDefinition;

/// Primitive JSON types the gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    fn from_schema_type(s: &str) -> Self {
        match s {
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => Self::String,
        }
    }

    pub fn describes(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// How a string field is length-limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Identifier-like (id, key, ref, session_id): at most 150 chars.
    Identifier,
    /// Title-like (title, name, filename, subject): at most 500 chars.
    Title,
    /// Everything else: unbounded here (token limits apply downstream).
    Free,
}

impl FieldKind {
    pub fn for_field(name: &str) -> Self {
        match name {
            "id" | "key" | "ref" | "session_id" => Self::Identifier,
            "title" | "name" | "filename" | "subject" => Self::Title,
            _ => Self::Free,
        }
    }

    pub fn max_chars(&self) -> Option<usize> {
        match self {
            Self::Identifier => Some(150),
            Self::Title => Some(500),
            Self::Free => None,
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub kind: FieldKind,
}

/// The validated call surface of one tool.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub parameters: Vec<ParameterSpec>,
}

impl ToolSchema {
    /// Parse from a tool's JSON-Schema `parameters` block.
    ///
    /// Unrecognized schema constructs are ignored rather than rejected;
    /// the gateway validates what it understands.
    pub fn from_definition(def: &ToolDefinition) -> Self {
        let required: Vec<&str> = def
            .parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let parameters = def
            .parameters
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, spec)| ParameterSpec {
                        name: name.clone(),
                        param_type: spec
                            .get("type")
                            .and_then(Value::as_str)
                            .map(ParamType::from_schema_type)
                            .unwrap_or(ParamType::String),
                        required: required.contains(&name.as_str()),
                        kind: FieldKind::for_field(name),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: def.name.clone(),
            parameters,
        }
    }
}

/// Lookup table of tool schemas by name.
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    by_name: HashMap<String, ToolSchema>,
}

impl SchemaCatalog {
    pub fn from_definitions(defs: &[ToolDefinition]) -> Self {
        Self {
            by_name: defs
                .iter()
                .map(|d| (d.name.clone(), ToolSchema::from_definition(d)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSchema> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
