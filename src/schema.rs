//! Schema translation: remote JSON Schemas into parameter contracts
//!
//! Remote servers describe tool inputs as `{properties, required}` JSON
//! Schema objects. This module derives a `ParamSpec` list from that shape and
//! provides the validating/defaulting step that runs before every invocation.

use crate::error::BridgeError;
use crate::session::McpSession;
use crate::tool::CallableTool;
use crate::types::{ItemKind, ParamKind, ParamSpec, RemoteTool, ToolDescriptor};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Derive the parameter contract from a tool's input schema.
///
/// An empty or property-less schema yields a single optional `query` string
/// parameter so every tool remains invocable with free-form input.
pub fn translate_schema(schema: &Value) -> Vec<ParamSpec> {
    let properties = match schema.get("properties").and_then(Value::as_object) {
        Some(props) if !props.is_empty() => props,
        _ => return vec![fallback_query_param()],
    };

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    properties
        .iter()
        .map(|(name, prop)| {
            let kind = ParamKind::from_type_tag(
                prop.get("type").and_then(Value::as_str).unwrap_or("string"),
                prop.get("items"),
            );
            let is_required = required.contains(&name.as_str());

            // Optional parameters always carry a default: the schema's own
            // when present, the type's generic default otherwise. Enum
            // constraints are not consulted, so the computed default may lie
            // outside the enum set.
            let default = if is_required {
                None
            } else {
                Some(
                    prop.get("default")
                        .cloned()
                        .unwrap_or_else(|| kind.default_value()),
                )
            };

            let enum_values = prop
                .get("enum")
                .and_then(Value::as_array)
                .map(|values| values.to_vec());

            ParamSpec {
                name: name.clone(),
                description: prop
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                kind,
                required: is_required,
                default,
                enum_values,
            }
        })
        .collect()
}

/// Whether the schema forbids arguments beyond its declared properties
pub fn is_closed_schema(schema: &Value) -> bool {
    schema.get("additionalProperties") == Some(&Value::Bool(false))
}

/// Build a descriptor for a remote tool, namespaced `<server>_<tool>`
pub fn descriptor_for(server: &str, tool: &RemoteTool) -> ToolDescriptor {
    ToolDescriptor {
        name: format!("{}_{}", server, tool.name),
        description: tool
            .description
            .clone()
            .unwrap_or_else(|| format!("Tool '{}' from server '{}'", tool.name, server)),
        parameters: translate_schema(&tool.input_schema),
        closed: is_closed_schema(&tool.input_schema),
    }
}

/// Wrap a remote tool into a callable bound to its session.
///
/// The callable shares ownership of the session, so the underlying transport
/// outlives the connection handle that produced it.
pub fn wrap_remote_tool(
    server: &str,
    tool: &RemoteTool,
    session: Arc<McpSession>,
) -> CallableTool {
    let descriptor = descriptor_for(server, tool);
    let remote_name = tool.name.clone();

    CallableTool::from_async(descriptor, move |args| {
        let session = Arc::clone(&session);
        let remote_name = remote_name.clone();
        async move { session.call_tool(&remote_name, args).await }
    })
}

/// Validate arguments against a descriptor and fill in defaults.
///
/// Runs before every invocation: required parameters must be present, enum
/// constraints apply to caller-supplied values, array elements are coerced to
/// the declared item kind, and missing optionals are defaulted.
pub fn validate_arguments(
    descriptor: &ToolDescriptor,
    arguments: Value,
) -> Result<Value, BridgeError> {
    let mut args = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(BridgeError::validation(format!(
                "arguments must be an object, got {}",
                type_name(&other)
            )));
        }
    };

    if descriptor.closed {
        for key in args.keys() {
            if !descriptor.parameters.iter().any(|p| p.name == *key) {
                return Err(BridgeError::validation(format!(
                    "unexpected argument '{}'",
                    key
                )));
            }
        }
    }

    for param in &descriptor.parameters {
        match args.get(&param.name) {
            Some(value) => {
                if let Some(allowed) = &param.enum_values {
                    if !allowed.contains(value) {
                        return Err(BridgeError::validation(format!(
                            "parameter '{}' must be one of {}",
                            param.name,
                            serde_json::to_string(allowed).unwrap_or_default()
                        )));
                    }
                }
                if let ParamKind::Array(item) = &param.kind {
                    let coerced = coerce_array(&param.name, value, *item)?;
                    args.insert(param.name.clone(), coerced);
                }
            }
            None if param.required => {
                return Err(BridgeError::validation(format!(
                    "missing required parameter '{}'",
                    param.name
                )));
            }
            None => {
                if let Some(default) = &param.default {
                    args.insert(param.name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(args))
}

fn coerce_array(name: &str, value: &Value, item: ItemKind) -> Result<Value, BridgeError> {
    let elements = value.as_array().ok_or_else(|| {
        BridgeError::validation(format!("parameter '{}' must be an array", name))
    })?;

    let coerced = elements
        .iter()
        .map(|element| coerce_item(name, element, item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Value::Array(coerced))
}

fn coerce_item(name: &str, value: &Value, item: ItemKind) -> Result<Value, BridgeError> {
    let mismatch = || {
        BridgeError::validation(format!(
            "element of '{}' cannot be coerced to {:?}",
            name, item
        ))
    };

    match item {
        ItemKind::String => Ok(match value {
            Value::String(_) => value.clone(),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            _ => return Err(mismatch()),
        }),
        ItemKind::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ItemKind::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ItemKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        ItemKind::Object => value
            .is_object()
            .then(|| value.clone())
            .ok_or_else(mismatch),
    }
}

fn fallback_query_param() -> ParamSpec {
    ParamSpec {
        name: "query".to_string(),
        description: "Query or input for the tool".to_string(),
        kind: ParamKind::String,
        required: false,
        default: Some(Value::String(String::new())),
        enum_values: None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(schema: Value) -> ToolDescriptor {
        descriptor_for(
            "srv",
            &RemoteTool::new("tool").with_input_schema(schema),
        )
    }

    #[test]
    fn test_translate_basic_schema() {
        let params = translate_schema(&json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path"},
                "depth": {"type": "integer"}
            },
            "required": ["path"]
        }));

        let path = params.iter().find(|p| p.name == "path").unwrap();
        assert!(path.required);
        assert_eq!(path.default, None);
        assert_eq!(path.description, "File path");

        let depth = params.iter().find(|p| p.name == "depth").unwrap();
        assert!(!depth.required);
        assert_eq!(depth.default, Some(json!(0)));
    }

    #[test]
    fn test_translate_empty_schema_yields_query_fallback() {
        let params = translate_schema(&json!({}));
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "query");
        assert!(!params[0].required);
    }

    #[test]
    fn test_explicit_schema_default_wins() {
        let params = translate_schema(&json!({
            "properties": {"limit": {"type": "integer", "default": 10}}
        }));
        assert_eq!(params[0].default, Some(json!(10)));
    }

    #[test]
    fn test_enum_constrained_optional_gets_type_default() {
        // The generic type default applies even when it is outside the enum
        let params = translate_schema(&json!({
            "properties": {"mode": {"type": "string", "enum": ["fast", "slow"]}}
        }));
        assert_eq!(params[0].default, Some(json!("")));
        assert_eq!(params[0].enum_values, Some(vec![json!("fast"), json!("slow")]));
    }

    #[test]
    fn test_descriptor_namespaces_tool_name() {
        let d = descriptor(json!({}));
        assert_eq!(d.name, "srv_tool");
    }

    #[test]
    fn test_validate_missing_required() {
        let d = descriptor(json!({
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        }));
        let result = validate_arguments(&d, json!({}));
        assert!(matches!(result, Err(BridgeError::Validation { .. })));
    }

    #[test]
    fn test_validate_fills_optional_defaults() {
        let d = descriptor(json!({
            "properties": {
                "path": {"type": "string"},
                "recursive": {"type": "boolean"}
            },
            "required": ["path"]
        }));
        let args = validate_arguments(&d, json!({"path": "/tmp"})).unwrap();
        assert_eq!(args["recursive"], json!(false));
    }

    #[test]
    fn test_open_schema_passes_unknown_arguments() {
        let d = descriptor(json!({"properties": {"a": {"type": "string"}}}));
        let args = validate_arguments(&d, json!({"a": "x", "extra": 1})).unwrap();
        assert_eq!(args["extra"], json!(1));
    }

    #[test]
    fn test_closed_schema_rejects_unknown_arguments() {
        let d = descriptor(json!({
            "properties": {"a": {"type": "string"}},
            "additionalProperties": false
        }));
        let result = validate_arguments(&d, json!({"a": "x", "extra": 1}));
        assert!(matches!(result, Err(BridgeError::Validation { .. })));
    }

    #[test]
    fn test_enum_rejects_out_of_set_supplied_value() {
        let d = descriptor(json!({
            "properties": {"mode": {"type": "string", "enum": ["fast", "slow"]}}
        }));
        let result = validate_arguments(&d, json!({"mode": "warp"}));
        assert!(matches!(result, Err(BridgeError::Validation { .. })));
        assert!(validate_arguments(&d, json!({"mode": "fast"})).is_ok());
    }

    #[test]
    fn test_array_item_coercion() {
        let d = descriptor(json!({
            "properties": {"ids": {"type": "array", "items": {"type": "integer"}}}
        }));
        let args = validate_arguments(&d, json!({"ids": [1, "2", 3]})).unwrap();
        assert_eq!(args["ids"], json!([1, 2, 3]));

        let result = validate_arguments(&d, json!({"ids": ["abc"]}));
        assert!(matches!(result, Err(BridgeError::Validation { .. })));
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        let d = descriptor(json!({}));
        assert!(matches!(
            validate_arguments(&d, json!([1, 2])),
            Err(BridgeError::Validation { .. })
        ));
        // Null is treated as the empty argument set
        assert!(validate_arguments(&d, Value::Null).is_ok());
    }
}
