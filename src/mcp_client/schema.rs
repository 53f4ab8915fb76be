//! Schema normalization — converts MCP `inputSchema` values into the
//! function-calling parameter shape published in the catalog.
//!
//! Rules, applied recursively:
//! - a node with `properties` becomes an object schema whose property values
//!   are normalized and whose `required` list is copied (default `[]`);
//! - otherwise a `oneOf` / `anyOf` node keeps its key and normalizes every
//!   alternative in order (`oneOf` wins when both appear);
//! - otherwise a node with `"type": "array"` normalizes its `items`;
//! - anything else is returned unchanged.
//!
//! Keys the rules do not touch stay where they were. Nodes are never required
//! to declare a `type`.

use serde_json::{Map, Value};

use super::types::{McpToolDefinition, ToolDescriptor};

/// Normalize one schema node (and everything beneath it).
pub fn normalize_schema(schema: &Value) -> Value {
    let Value::Object(node) = schema else {
        return schema.clone();
    };

    if let Some(properties) = node.get("properties") {
        return normalize_object(node, properties);
    }

    if let Some(key) = composition_key(node) {
        return normalize_composition(node, key);
    }

    if node.get("type").and_then(Value::as_str) == Some("array") {
        return normalize_array(node);
    }

    schema.clone()
}

/// Build the catalog entry for one raw tool definition.
pub fn to_descriptor(tool: &McpToolDefinition) -> ToolDescriptor {
    ToolDescriptor {
        name: tool.name.clone(),
        description: tool.description.clone().unwrap_or_default(),
        parameters: normalize_schema(&tool.input_schema),
    }
}

fn normalize_object(node: &Map<String, Value>, properties: &Value) -> Value {
    let properties = match properties {
        Value::Object(props) => Value::Object(
            props
                .iter()
                .map(|(name, prop)| (name.clone(), normalize_schema(prop)))
                .collect(),
        ),
        // Malformed `properties`: keep it as the server sent it.
        other => other.clone(),
    };
    let required = node
        .get("required")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    let mut out = Map::with_capacity(node.len() + 2);
    out.insert("type".to_string(), Value::String("object".to_string()));
    for (key, value) in node {
        match key.as_str() {
            "type" | "required" => {}
            "properties" => {
                out.insert(key.clone(), properties.clone());
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out.insert("required".to_string(), required);
    Value::Object(out)
}

fn composition_key(node: &Map<String, Value>) -> Option<&'static str> {
    if node.contains_key("oneOf") {
        Some("oneOf")
    } else if node.contains_key("anyOf") {
        Some("anyOf")
    } else {
        None
    }
}

fn normalize_composition(node: &Map<String, Value>, key: &str) -> Value {
    let mut out = Map::with_capacity(node.len());
    for (k, value) in node {
        if k == key {
            let alternatives = match value {
                Value::Array(items) => Value::Array(items.iter().map(normalize_schema).collect()),
                other => other.clone(),
            };
            out.insert(k.clone(), alternatives);
        } else if k == "anyOf" || k == "oneOf" {
            // The losing composition key is dropped.
        } else {
            out.insert(k.clone(), value.clone());
        }
    }
    Value::Object(out)
}

fn normalize_array(node: &Map<String, Value>) -> Value {
    Value::Object(
        node.iter()
            .map(|(k, value)| {
                if k == "items" {
                    (k.clone(), normalize_schema(value))
                } else {
                    (k.clone(), value.clone())
                }
            })
            .collect(),
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────
