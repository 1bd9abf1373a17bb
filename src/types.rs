//! Core data model: tool descriptors, parameter specs, handshake types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A tool as advertised by a remote server (raw JSON Schema attached)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

impl RemoteTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Parameter kind derived from a JSON Schema `type` tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array(ItemKind),
}

/// Element kind for array parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
}

impl ParamKind {
    /// Map a JSON Schema type tag; unknown tags fall back to string
    pub fn from_type_tag(tag: &str, items: Option<&Value>) -> Self {
        match tag {
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "object" => Self::Object,
            "array" => {
                let item = items
                    .and_then(|i| i.get("type"))
                    .and_then(|t| t.as_str())
                    .map(ItemKind::from_type_tag)
                    .unwrap_or(ItemKind::String);
                Self::Array(item)
            }
            _ => Self::String,
        }
    }

    /// Generic default for the kind: `"" / 0 / 0.0 / false / [] / {}`.
    ///
    /// Enum constraints do not participate here; an enum-constrained optional
    /// parameter gets its JSON type's default even when that value is outside
    /// the enum set.
    pub fn default_value(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Integer => Value::from(0),
            Self::Number => Value::from(0.0),
            Self::Boolean => Value::Bool(false),
            Self::Object => Value::Object(serde_json::Map::new()),
            Self::Array(_) => Value::Array(Vec::new()),
        }
    }
}

impl ItemKind {
    pub fn from_type_tag(tag: &str) -> Self {
        match tag {
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "object" => Self::Object,
            _ => Self::String,
        }
    }
}

/// Validated, defaulted parameter contract for one parameter
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    pub kind: ParamKind,
    pub required: bool,
    /// Present iff not required; computed from `kind` when the schema does
    /// not supply one explicitly
    pub default: Option<Value>,
    pub enum_values: Option<Vec<Value>>,
}

/// Immutable descriptor of a callable tool
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
    /// Schema declared `additionalProperties: false`; unknown arguments are
    /// rejected instead of passed through
    pub closed: bool,
}

/// Server information returned after the handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub protocol_version: Option<String>,
}

/// Initialize request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

/// Client capabilities advertised during initialize
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(default)]
    pub roots: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub sampling: Option<HashMap<String, Value>>,
}

/// Client identification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "toolbridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Initialize response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    pub server_info: ServerInfo,
}

/// Content blocks in tool-call results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { data: String, mime_type: String },
}

/// Result of a remote tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Join all text blocks, the transport-independent normalization
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_tool_serialization() {
        let tool = RemoteTool::new("read_file")
            .with_description("Read a file")
            .with_input_schema(json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }));

        let json = serde_json::to_string(&tool).unwrap();
        let parsed: RemoteTool = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, "read_file");
        assert_eq!(parsed.description, Some("Read a file".to_string()));
    }

    #[test]
    fn test_param_kind_defaults() {
        assert_eq!(ParamKind::String.default_value(), json!(""));
        assert_eq!(ParamKind::Integer.default_value(), json!(0));
        assert_eq!(ParamKind::Number.default_value(), json!(0.0));
        assert_eq!(ParamKind::Boolean.default_value(), json!(false));
        assert_eq!(ParamKind::Array(ItemKind::String).default_value(), json!([]));
        assert_eq!(ParamKind::Object.default_value(), json!({}));
    }

    #[test]
    fn test_param_kind_from_type_tag() {
        assert_eq!(ParamKind::from_type_tag("integer", None), ParamKind::Integer);
        assert_eq!(ParamKind::from_type_tag("unknown", None), ParamKind::String);
        assert_eq!(
            ParamKind::from_type_tag("array", Some(&json!({"type": "integer"}))),
            ParamKind::Array(ItemKind::Integer)
        );
        assert_eq!(
            ParamKind::from_type_tag("array", None),
            ParamKind::Array(ItemKind::String)
        );
    }

    #[test]
    fn test_tool_call_result_joined_text() {
        let result = ToolCallResult {
            content: vec![
                ContentBlock::Text { text: "a".into() },
                ContentBlock::Image {
                    data: "...".into(),
                    mime_type: "image/png".into(),
                },
                ContentBlock::Text { text: "b".into() },
            ],
            is_error: false,
        };
        assert_eq!(result.joined_text(), "a\nb");
    }
}
