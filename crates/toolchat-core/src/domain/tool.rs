//! Tool definitions in the calling convention models expect.
//!
//! MCP servers describe tools with a bare JSON Schema. Models take
//! OpenAI-style `{type: "function", function: {name, description, parameters}}`
//! entries, and Gemini additionally wants a reduced, upper-cased schema dialect.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::mcp::McpTool;

/// Kind of callable tool. Only functions exist today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[default]
    Function,
}

/// Function part of a tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// A provider-agnostic callable tool, as bound to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type", default)]
    pub kind: ToolKind,
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    /// Tool name the model will call.
    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Translate an MCP tool into a strict function definition.
    pub fn from_mcp_tool(tool: &McpTool) -> Self {
        Self {
            kind: ToolKind::Function,
            function: FunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: strict_parameters(tool.input_schema.as_ref()),
            },
        }
    }
}

impl From<&McpTool> for ToolDefinition {
    fn from(tool: &McpTool) -> Self {
        Self::from_mcp_tool(tool)
    }
}

/// Build a strict parameter schema.
///
/// A missing or non-object schema becomes an empty object schema.
/// `additionalProperties: false` is injected only when the schema does not
/// already say something about additional properties.
pub fn strict_parameters(schema: Option<&Value>) -> Value {
    let mut params = match schema {
        Some(Value::Object(map)) => map.clone(),
        _ => {
            let mut map = Map::new();
            map.insert("type".to_string(), json!("object"));
            map.insert("properties".to_string(), json!({}));
            map
        }
    };

    params
        .entry("additionalProperties")
        .or_insert(Value::Bool(false));

    Value::Object(params)
}

/// Convert function definitions into the schema subset Gemini accepts.
///
/// Gemini rejects empty object schemas, lower-case type names, and
/// `additionalProperties`. Every object gets at least a placeholder property.
pub fn to_gemini_tools(tools: &[ToolDefinition]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|tool| ToolDefinition {
            kind: ToolKind::Function,
            function: FunctionDefinition {
                name: tool.function.name.clone(),
                description: Some(tool.function.description.clone().unwrap_or_default()),
                parameters: gemini_parameters(&tool.function.parameters),
            },
        })
        .collect()
}

fn placeholder_properties() -> Value {
    json!({ "dummy": { "type": "STRING" } })
}

fn gemini_parameters(schema: &Value) -> Value {
    let Some(schema) = schema.as_object() else {
        return json!({
            "type": "OBJECT",
            "properties": placeholder_properties(),
            "required": [],
        });
    };

    let mut params = Map::new();
    params.insert("type".to_string(), json!("OBJECT"));

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        params.insert("required".to_string(), Value::Array(required.clone()));
    }

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| (name.clone(), gemini_property(prop)))
                .collect::<Map<_, _>>()
        })
        .filter(|props| !props.is_empty())
        .map_or_else(placeholder_properties, Value::Object);

    params.insert("properties".to_string(), properties);
    Value::Object(params)
}

fn gemini_property(prop: &Value) -> Value {
    let mut simple = Map::new();
    let kind = gemini_type(prop);

    if kind == "OBJECT" {
        let nested = prop
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, sub)| (name.clone(), gemini_property(sub)))
                    .collect::<Map<_, _>>()
            })
            .filter(|props| !props.is_empty())
            .map_or_else(placeholder_properties, Value::Object);
        simple.insert("properties".to_string(), nested);
    }

    if let Some(description) = prop.get("description") {
        simple.insert("description".to_string(), description.clone());
    }

    if let Some(values) = prop.get("enum").and_then(Value::as_array) {
        let values = values
            .iter()
            .map(|v| match v.as_str() {
                Some("") => json!("none"),
                _ => v.clone(),
            })
            .collect();
        simple.insert("enum".to_string(), Value::Array(values));
    }

    if kind == "ARRAY" {
        if let Some(items) = prop.get("items") {
            simple.insert("items".to_string(), gemini_property(items));
        }
    }

    simple.insert("type".to_string(), Value::String(kind));
    Value::Object(simple)
}

/// Pick a Gemini type name from a `type` string, a `type` array, or an `all_of` list.
fn gemini_type(prop: &Value) -> String {
    let from_type_field = |value: &Value| match value.get("type") {
        Some(Value::String(kind)) => Some(kind.clone()),
        Some(Value::Array(kinds)) => kinds.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    };

    from_type_field(prop)
        .or_else(|| {
            prop.get("all_of")
                .and_then(Value::as_array)
                .and_then(|items| items.iter().find_map(from_type_field))
        })
        .map_or_else(|| "STRING".to_string(), |kind| gemini_type_name(&kind))
}

fn gemini_type_name(kind: &str) -> String {
    match kind.to_ascii_lowercase().as_str() {
        "string" => "STRING".to_string(),
        "number" => "NUMBER".to_string(),
        "integer" => "INTEGER".to_string(),
        "boolean" => "BOOLEAN".to_string(),
        "array" => "ARRAY".to_string(),
        "object" => "OBJECT".to_string(),
        _ => kind.to_string(),
    }
}
