use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Represents an MCP tool definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: Option<&str>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.map(str::to_string),
            input_schema,
        }
    }
}

/// One content item of an MCP tool result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        mime_type: String,
    },
    Resource {
        uri: String,
        mime_type: Option<String>,
    },
}

impl ToolContent {
    fn into_value(self) -> Value {
        match self {
            // Servers such as mcp-server-sqlite return JSON-encoded rows as text
            ToolContent::Text { text } => {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            }
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        }
    }
}

/// Collapse the content list of a tool result into one structured value.
pub(crate) fn content_to_value(content: Vec<ToolContent>) -> Value {
    let mut values: Vec<Value> = content.into_iter().map(ToolContent::into_value).collect();
    match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}

/// Text carried by an error result, used as the failure message.
pub(crate) fn content_to_text(content: &[ToolContent]) -> String {
    let text: Vec<&str> = content
        .iter()
        .filter_map(|c| match c {
            ToolContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    if text.is_empty() {
        "tool returned an error without a message".to_string()
    } else {
        text.join("\n")
    }
}
